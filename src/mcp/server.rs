/// MCP server over stdio.
///
/// `McpContext` carries the shared service handles; `McpServer` owns startup.
use crate::mcp::tools::AppTools;
use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use std::sync::Arc;
use tracing::info;

use crate::{config::Config, db::Db, embedder::Embedder, pipeline::assistant::Assistant};
use tokio::sync::Mutex as TokioMutex;

/// Shared application context available to all tool handlers.
#[derive(Clone)]
pub struct McpContext {
    pub assistant: Arc<Assistant>,
    pub db: Arc<TokioMutex<Db>>,
    pub embedder: Arc<dyn Embedder>,
    pub config: Arc<Config>,
}

#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Serves until the client disconnects.
    pub async fn start(self) -> Result<()> {
        info!("starting MCP server on stdio");
        let (stdin, stdout) = stdio();

        let app_tools = AppTools::new(self.ctx.clone());
        let router = Router::new(app_tools.clone()).with_tools(app_tools.tool_router.clone());

        let running = router
            .serve((stdin, stdout))
            .await
            .context("MCP handshake failed on stdio transport")?;
        running
            .waiting()
            .await
            .context("MCP server encountered an error during stdio transport")?;

        Ok(())
    }
}
