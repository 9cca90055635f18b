// Query Engine Module
// Scatter-gather execution of one read query across many hosts

pub mod binder;
pub mod coordinator;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod host_filter;
pub mod hosts;
pub mod read_only;
pub mod registry;
pub mod traits;
pub mod types;

pub use coordinator::{ExecutionSummary, Gateway, GatewayError, GatewayOptions, PreparedQuery};
pub use error::{EngineError, RequestError};
pub use hosts::{HostEntry, HostRegistry};
pub use registry::DriverRegistry;
pub use traits::HostDriver;
pub use types::*;
