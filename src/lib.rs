//! # CryptoMentor — retrieval-augmented assistant for OKX help articles
//!
//! Ingests OKX Academy articles, chunks and embeds them into a local vector
//! store, then answers questions using only the retrieved passages. Every
//! draft answer goes through a self-check pass that drops claims the context
//! does not support.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration with serde defaults
//! - **[`db`]** — SQLite + sqlite-vec vector store (upsert, search, article listing)
//! - **[`embedder`]** — embedding seam, OpenAI-compatible client, tiktoken counting
//! - **[`llm`]** — chat-completion seam and OpenAI-compatible client
//! - **[`indexer`]** — chunking, corpus preparation, batch indexing
//! - **[`pipeline`]** — safety gate, retriever, answer self-check, assistant
//! - **[`server`]** — axum HTTP front end
//! - **[`mcp`]** — MCP tools over stdio (rmcp)

pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod llm;
pub mod mcp;
pub mod pipeline;
pub mod server;
