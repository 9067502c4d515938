//! logtail library components
//!
//! Exposes the reverse tail scanner and the HTTP server pieces for
//! integration tests and benchmarks.

pub mod http_server;
pub mod log_generator;
pub mod log_request;
pub mod server_config;
pub mod stream_body;
pub mod tail_scanner;

// Re-export commonly used types
pub use http_server::TailServer;
pub use log_request::LogRequest;
pub use server_config::ServerConfig;
pub use tail_scanner::{TailParams, TailScanner};
