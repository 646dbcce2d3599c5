pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod storage;
pub mod text;
pub mod types;

pub use error::{PipelineError, Result};
pub use pipeline::Orchestrator;
