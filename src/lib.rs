//! Proxy Assess - bulk proxy quality assessment
//!
//! Measures reachability, latency and sustained download throughput through
//! a list of HTTP proxies and keeps the ones fast enough to be useful.

pub mod error;
pub mod proxy;
pub mod tui;

pub use error::{AssessError, ProbeError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
