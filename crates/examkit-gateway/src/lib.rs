//! examkit-gateway: Exam Gateway integrations.
//!
//! The HTTP/JSON `ExamGateway` lives here next to an in-memory stand-in for
//! tests. `config` loads `examkit.toml` and builds the gateway from it.

pub mod config;
mod error;
pub mod http;
pub mod mock;

pub use config::{create_gateway, load_config, load_config_from, ExamkitConfig, GatewayConfig};
pub use http::HttpExamGateway;
pub use mock::MockGateway;
