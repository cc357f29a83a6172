//! Integration tests for text2sql.

pub mod athena_test;
pub mod config_test;
pub mod executor_test;
pub mod pipeline_test;
