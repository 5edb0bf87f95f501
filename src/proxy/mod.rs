//! Proxy module for assessing proxy quality
//!
//! This module provides functionality for:
//! - Gating candidates on a syntactic `IPv4:port` check
//! - Measuring latency and download throughput through each candidate
//! - Assessing many candidates concurrently and filtering by throughput
//! - Reading candidate lists and saving the accepted set

pub mod assessor;
pub mod candidates;
pub mod models;
pub mod probe;
pub mod sampler;
pub mod validator;

pub use assessor::{AssessConfig, Assessor};
pub use candidates::CandidateList;
pub use models::{Assessment, Progress, ProxyResult, ProxyStatus, RoundSample};
pub use probe::{HttpProbe, HttpSession, Probe, ProbeConfig, RetryPolicy};
pub use sampler::Sampler;
pub use validator::validate;
