pub mod use_cases;

pub use use_cases::ingestion::IngestionCoordinator;
pub use use_cases::query_executor::{QueryExecutor, QueryResult};
pub use use_cases::query_sanitizer::{sanitize, SanitizedQuery};
