//! Chat prompt templates.
use minijinja::{Environment, context};

pub const SYSTEM_PROMPT: &str = "Ты — CryptoMentor, сотрудник поддержки OKX. \
Отвечаешь только на основе переданного контекста из статей OKX Academy и никогда не придумываешь факты.";

/// Marker the compression prompt asks for when nothing is relevant.
pub const NO_OUTPUT: &str = "NO_OUTPUT";

const DRAFT_TEMPLATE: &str = r#"Ответь на вопрос пользователя, используя ТОЛЬКО контекст ниже.
Если в контексте нет ответа, так и скажи.

Формат ответа строго из трёх блоков:
Кратко:
- одно-два предложения с главным выводом

Подробно:
- одно фактическое утверждение на строку, каждое опирается на контекст

Источники:
- названия статей, на которые ты опирался

Контекст:
{{ context }}

Вопрос: {{ query }}"#;

const COMPRESSION_TEMPLATE: &str = r#"Дан вопрос и фрагмент статьи. Выпиши из фрагмента дословно только те предложения, которые помогают ответить на вопрос.
Ничего не перефразируй и не добавляй. Если релевантных предложений нет, ответь ровно {{ no_output }}.

Вопрос: {{ query }}

Фрагмент:
>>>
{{ document }}
>>>
Релевантные предложения:"#;

const VERIFICATION_TEMPLATE: &str = r#"Проверь каждое утверждение по контексту.
Метка TRUE — утверждение прямо подтверждается контекстом, FALSE — не подтверждается или противоречит ему.

Верни только JSON-массив без пояснений и без markdown, по одному объекту на утверждение:
[{"statement": "<текст утверждения без маркера списка>", "label": "TRUE" или "FALSE"}]

Утверждения:
{{ statements }}

Контекст:
{{ context }}"#;

/// The three templates, compiled once at startup.
pub struct Prompts {
    env: Environment<'static>,
}

impl Prompts {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("draft.txt", DRAFT_TEMPLATE)?;
        env.add_template("compress.txt", COMPRESSION_TEMPLATE)?;
        env.add_template("verify.txt", VERIFICATION_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn draft(&self, context: &str, query: &str) -> Result<String, minijinja::Error> {
        self.env
            .get_template("draft.txt")?
            .render(context! { context => context, query => query })
    }

    pub fn compression(&self, document: &str, query: &str) -> Result<String, minijinja::Error> {
        self.env.get_template("compress.txt")?.render(context! {
            document => document,
            query => query,
            no_output => NO_OUTPUT,
        })
    }

    /// `statements` are rendered one per line as `- {statement}`.
    pub fn verification(
        &self,
        statements: &[String],
        context: &str,
    ) -> Result<String, minijinja::Error> {
        let statements = statements
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.env.get_template("verify.txt")?.render(context! {
            statements => statements,
            context => context,
        })
    }
}
