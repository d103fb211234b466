pub mod column_stats;
pub mod dataset_reader;
pub mod ingestion;
pub mod project_service;
pub mod query_executor;
pub mod query_sanitizer;
pub mod schema_inference;
pub mod sql_lexer;
pub mod table_provisioner;
