//! Offline corpus preparation and indexing.
pub mod chunker;
pub mod core;
pub mod corpus;
