//! Worker pool and the scan engine built on it.

mod engine;
mod pool;

pub use engine::{service_record, Scanner, SweepReport, TIMEOUT_BANNER};
pub use pool::{run_pool, PoolOptions};
