pub mod cli;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod tariff;
pub mod transform;
pub mod window;

pub use pipeline::{Pipeline, PipelineError};
