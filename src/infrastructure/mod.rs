//! Infrastructure - cold path only
//!
//! This module contains non-latency-critical code:
//! - Logging and metrics
//! - Configuration management
//! - Subscriber fan-out and the API server
//! - Graceful shutdown

pub mod api;
pub mod config;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use api::{start_server, AppState};
pub use hub::SubscriberHub;
pub use logging::init_logging;
pub use metrics::MetricsCollector;
pub use shutdown::{Shutdown, ShutdownLatch, ShutdownSignal};
