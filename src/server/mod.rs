//! HTTP front end: a question form, its HTML answer page and a JSON API.
pub mod render;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use crate::pipeline::PipelineError;
use crate::pipeline::assistant::{Assistant, AssistantReply};
use render::Pages;

#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<Assistant>,
    pub pages: Arc<Pages>,
}

impl AppState {
    pub fn new(assistant: Arc<Assistant>) -> Result<Self, minijinja::Error> {
        Ok(Self {
            assistant,
            pages: Arc::new(Pages::new()?),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("template rendering failed: {0}")]
    Render(#[from] minijinja::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        let body = ErrorBody {
            message: "Не удалось получить ответ, попробуйте позже.".to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask_form))
        .route("/api/ask", post(ask_json))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ServerError> {
    Ok(Html(state.pages.index()?))
}

async fn ask_form(
    State(state): State<AppState>,
    Form(request): Form<AskRequest>,
) -> Result<Html<String>, ServerError> {
    let reply = state.assistant.answer(&request.query).await?;
    Ok(Html(state.pages.answer(&request.query, &reply)?))
}

async fn ask_json(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AssistantReply>, ServerError> {
    Ok(Json(state.assistant.answer(&request.query).await?))
}

/// Serve until Ctrl-C.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("listening on http://{addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {e}");
            }
        })
        .await
        .context("server shutdown")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tokio::sync::Mutex as TokioMutex;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::Db;
    use crate::embedder::mock::MockEmbedder;
    use crate::embedder::tokenizer::WhitespaceCounter;
    use crate::llm::ScriptedChatModel;

    fn app() -> Router {
        let assistant = Assistant::from_services(
            &Config::default(),
            Arc::new(TokioMutex::new(Db::open_in_memory(16).unwrap())),
            Arc::new(MockEmbedder::new(16)),
            Arc::new(ScriptedChatModel::new()),
            Arc::new(WhitespaceCounter),
        )
        .unwrap();
        router(AppState::new(Arc::new(assistant)).unwrap())
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_index() {
        let app = app();
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains(r#"<form method="post" action="/ask">"#));
    }

    #[tokio::test]
    async fn test_form_refusal_is_rendered() {
        let body = "query=%D0%BE%D0%B1%D0%BE%D0%B9%D1%82%D0%B8+KYC";
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ask")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("<strong>Вопрос отклонён по соображениям безопасности.</strong>"));
        assert!(html.contains("обойти KYC"));
    }

    #[tokio::test]
    async fn test_api_no_context() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ask")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"query": "Как работает стейкинг?"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["kind"], "no_context");
        assert_eq!(json["question"], "Как работает стейкинг?");
        assert!(json["sources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_api_provider_failure_is_500() {
        use crate::db::models::ChunkRecord;
        use crate::embedder::Embedder;

        let embedder = Arc::new(MockEmbedder::new(16));
        let mut db = Db::open_in_memory(16).unwrap();
        let record = ChunkRecord {
            article_id: "0".to_string(),
            chunk_id: "0_0".to_string(),
            title: "T".to_string(),
            url: String::new(),
            description: "D".to_string(),
            tag_primary: "general".to_string(),
            lang: "ru".to_string(),
            chunk_order: 0,
            content: "стейкинг".to_string(),
        };
        let vector = embedder.embed(&record.content).await.unwrap();
        db.upsert_chunks(&[record], &[vector]).unwrap();

        // compression is on by default and nothing is scripted
        let assistant = Assistant::from_services(
            &Config::default(),
            Arc::new(TokioMutex::new(db)),
            embedder,
            Arc::new(ScriptedChatModel::new()),
            Arc::new(WhitespaceCounter),
        )
        .unwrap();
        let app = router(AppState::new(Arc::new(assistant)).unwrap());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/ask")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"query": "стейкинг"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
