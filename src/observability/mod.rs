// Observability: metric catalog and recording helpers.

pub mod metrics;

pub use metrics::init_metrics;
