//! text2sql - ask questions about data in Amazon Athena.
//!
//! This library exposes the core modules for the binary and integration tests.

pub mod athena;
pub mod config;
pub mod error;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod safety;
