pub mod column_details;
pub mod connection;
pub mod datasets;
pub mod projects;

pub use connection::{init_schema, Store};
