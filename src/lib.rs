// xquery - read-only scatter-gather query gateway
// Core library

pub mod config;
pub mod engine;
pub mod export;
pub mod metrics;
pub mod observability;
pub mod server;

pub use config::{AuthKeys, Config, ConfigError};
pub use engine::{ExecutionSummary, Gateway, GatewayError, GatewayOptions, QueryRequest};
pub use export::{CsvSink, RecordBuffer, TabularSink};
pub use server::AppState;
