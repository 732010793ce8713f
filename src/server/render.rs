use minijinja::{Environment, context};
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, html};

use crate::pipeline::assistant::AssistantReply;

const EXAMPLE_QUESTIONS: &[&str] = &[
    "Какие ошибки совершают новички в криптотрейдинге?",
    "Как настроить торгового бота на OKX?",
    "Как купить USDT без комиссии на OKX?",
    "Как работает P2P-покупка с банковской карты на OKX?",
];

const LAYOUT: &str = r#"<!doctype html>
<html lang="ru">
<head>
<meta charset="utf-8">
<title>CryptoMentor — OKX Helper</title>
<style>
  main { max-width: 900px; margin: 0 auto; padding-top: 2rem; font-family: sans-serif; }
  textarea { width: 100%; }
  .answer { border-top: 1px solid #ddd; margin-top: 1.5rem; }
</style>
</head>
<body>
<main>
<h1>CryptoMentor — эксперт по OKX</h1>
<p>Задайте вопрос про трейдинг и сервисы OKX, и нейро-сотрудник ответит, опираясь на статьи OKX Academy.</p>
<form method="post" action="/ask">
  <label for="query">Введите вопрос</label>
  <textarea id="query" name="query" rows="2" placeholder="Например: {{ examples[0] }}">{{ query }}</textarea>
  <button type="submit">Спросить CryptoMentor</button>
</form>
<ul>
{%- for example in examples %}
  <li>{{ example }}</li>
{%- endfor %}
</ul>
{% block answer %}{% endblock %}
</main>
</body>
</html>"#;

const ANSWER_PAGE: &str = r#"{% extends "layout.html" %}
{% block answer %}<section class="answer">
{{ answer_html|safe }}
</section>{% endblock %}"#;

/// HTML page templates. `.html` names are auto-escaped by minijinja.
pub struct Pages {
    env: Environment<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("layout.html", LAYOUT)?;
        env.add_template("answer.html", ANSWER_PAGE)?;
        Ok(Self { env })
    }

    pub fn index(&self) -> Result<String, minijinja::Error> {
        self.env
            .get_template("layout.html")?
            .render(context! { examples => EXAMPLE_QUESTIONS, query => "" })
    }

    pub fn answer(&self, query: &str, reply: &AssistantReply) -> Result<String, minijinja::Error> {
        self.env.get_template("answer.html")?.render(context! {
            examples => EXAMPLE_QUESTIONS,
            query => query,
            answer_html => markdown_to_html(&reply.to_markdown()),
        })
    }
}

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Relative URLs and those with an allowed scheme. Browsers ignore ASCII
/// whitespace and control characters inside a scheme, so they are dropped
/// before the check.
fn is_safe_url(url: &str) -> bool {
    let cleaned: String = url
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    match cleaned.find([':', '/', '?', '#']) {
        Some(i) if cleaned[i..].starts_with(':') => ALLOWED_SCHEMES.contains(&&cleaned[..i]),
        _ => true,
    }
}

fn sanitize_url(url: CowStr<'_>) -> CowStr<'_> {
    if is_safe_url(&url) {
        url
    } else {
        CowStr::Borrowed("#")
    }
}

/// Renders markdown to HTML. Answers echo user input and model output, so
/// raw HTML is emitted as escaped text and link or image URLs with a
/// scheme other than http, https or mailto are replaced by `#`.
pub fn markdown_to_html(markdown: &str) -> String {
    let events = Parser::new_ext(markdown, Options::empty()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: sanitize_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: sanitize_url(dest_url),
            title,
            id,
        }),
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::assistant::ReplyKind;

    #[test]
    fn test_markdown_to_html() {
        let html = markdown_to_html("**Вопрос:** Q\n\n- a\n- b");
        assert!(html.contains("<strong>Вопрос:</strong> Q"));
        assert!(html.contains("<li>a</li>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = markdown_to_html("hi <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));

        let block = markdown_to_html("<div onclick=\"x()\">boom</div>");
        assert!(!block.contains("<div"));
    }

    #[test]
    fn test_javascript_links_are_neutralised() {
        let html = markdown_to_html("**Вопрос:** [нажми](javascript:alert(document.cookie))");
        assert!(!html.contains("javascript:"), "{html}");
        assert!(html.contains(r##"<a href="#">нажми</a>"##));

        for markdown in [
            "[x](JaVaScRiPt:alert(1))",
            "[x](java%0Ascript:alert(1))",
            "[x](<java\tscript:alert(1)>)",
            "[x](data:text/html;base64,PHNjcmlwdD4=)",
            "![img](javascript:alert(1))",
            "<javascript:alert(1)>",
        ] {
            let html = markdown_to_html(markdown);
            let targets = url_attributes(&html);
            assert!(!targets.is_empty(), "{markdown} -> {html}");
            assert!(targets.iter().all(|t| t == "#"), "{markdown} -> {html}");
        }
    }

    /// Values of every `href="..."` and `src="..."` attribute.
    fn url_attributes(html: &str) -> Vec<String> {
        ["href=\"", "src=\""]
            .into_iter()
            .flat_map(|attr| html.match_indices(attr).map(move |(i, _)| i + attr.len()))
            .filter_map(|start| {
                html[start..]
                    .find('"')
                    .map(|end| html[start..start + end].to_string())
            })
            .collect()
    }

    #[test]
    fn test_safe_links_are_kept() {
        let html = markdown_to_html(
            "[OKX](https://www.okx.com/ru/learn) [mail](mailto:support@okx.com) [rel](/ask) [frag](#top)",
        );
        assert!(html.contains(r#"href="https://www.okx.com/ru/learn""#));
        assert!(html.contains(r#"href="mailto:support@okx.com""#));
        assert!(html.contains(r#"href="/ask""#));
        assert!(html.contains(r##"href="#top""##));
    }

    #[test]
    fn test_answer_page_escapes_query() {
        let pages = Pages::new().unwrap();
        let reply = AssistantReply {
            question: "<b>q</b>".to_string(),
            answer: "ответ".to_string(),
            sources: vec!["- T — D".to_string()],
            kind: ReplyKind::Answered,
        };
        let page = pages.answer("<b>q</b>", &reply).unwrap();
        assert!(page.contains("&lt;b&gt;q"));
        assert!(!page.contains("<b>q</b>"));
        assert!(page.contains("<li>T — D</li>"));
    }
}
