//! Model Context Protocol surface (stdio transport via rmcp).
pub mod server;
pub mod tools;
