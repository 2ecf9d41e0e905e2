pub mod request_metrics;

pub use request_metrics::request_metrics_middleware;
