/// MCP tool handlers.
///
/// 1. ask           – full pipeline: safety gate, retrieval, draft, self-check
/// 2. search        – raw nearest chunks for a query, no model calls
/// 3. list_articles – indexed articles with chunk counts
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct AskParams {
    /// Question about OKX trading or services (Russian or English)
    query: String,
}

#[derive(Deserialize, JsonSchema)]
struct SearchParams {
    /// Search query (natural language)
    query: String,
    /// Max results (default: search_top_k from config)
    top_k: Option<usize>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Answer a question about OKX using only indexed OKX Academy articles. Unsupported claims are removed; the reply lists its sources."
    )]
    async fn ask(&self, params: Parameters<AskParams>) -> Result<CallToolResult, McpError> {
        let reply = self
            .ctx
            .assistant
            .answer(&params.0.query)
            .await
            .map_err(|e| McpError::internal_error(format!("answer failed: {e}"), None))?;

        json_result(serde_json::json!({
            "kind": reply.kind,
            "answer": reply.answer,
            "sources": reply.sources,
            "markdown": reply.to_markdown(),
        }))
    }

    #[tool(description = "Vector similarity search over indexed OKX article chunks")]
    async fn search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }

        let top_k = p.top_k.unwrap_or(self.ctx.config.search_top_k).max(1);

        let query_vector = self
            .ctx
            .embedder
            .embed(&p.query)
            .await
            .map_err(|e| McpError::internal_error(format!("embedding failed: {e}"), None))?;

        let results = {
            let db = self.ctx.db.lock().await;
            db.search(&query_vector, top_k)
                .map_err(|e| McpError::internal_error(format!("search failed: {e}"), None))?
        };
        debug!(hits = results.len(), "mcp search");

        let results_json: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "chunk_id": r.record.chunk_id,
                    "title": r.record.title,
                    "url": r.record.url,
                    "tag_primary": r.record.tag_primary,
                    "content": r.record.content,
                    "similarity": r.similarity,
                })
            })
            .collect();

        json_result(serde_json::json!({ "results": results_json }))
    }

    #[tool(description = "List indexed articles with their chunk counts")]
    async fn list_articles(&self) -> Result<CallToolResult, McpError> {
        let db = self.ctx.db.lock().await;
        let articles = db
            .list_articles()
            .map_err(|e| McpError::internal_error(format!("list failed: {e}"), None))?;

        let articles: Vec<serde_json::Value> = articles
            .iter()
            .map(|a| {
                serde_json::json!({
                    "article_id": a.article_id,
                    "title": a.title,
                    "url": a.url,
                    "chunks": a.chunks,
                    "indexed_at": a.indexed_at.to_rfc3339(),
                })
            })
            .collect();

        json_result(serde_json::json!({ "articles": articles }))
    }
}
