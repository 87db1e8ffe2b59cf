mod open;
mod models;
mod insert;
mod query;
mod schema;
mod sink;
mod arrow_schemas;
mod export_parquet;

pub use open::Db;
pub use models::*;
pub use sink::Sink;
pub use export_parquet::export_results_to_parquet;
