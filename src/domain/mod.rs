pub mod dataset;
pub mod error;
pub mod sql_type;
pub mod tabular;
