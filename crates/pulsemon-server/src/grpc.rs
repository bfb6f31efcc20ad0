//! gRPC `MetricsService`, backed by the same storage as the HTTP API.

pub mod service;

pub use service::MetricsServiceImpl;
