//! Proxy assessment data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Outcome classification of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxyStatus {
    Success,
    Failure,
    InvalidFormat,
}

impl fmt::Display for ProxyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyStatus::Success => write!(f, "Success"),
            ProxyStatus::Failure => write!(f, "Failure"),
            ProxyStatus::InvalidFormat => write!(f, "Invalid format"),
        }
    }
}

/// Readings of one liveness + download round
///
/// `None` means the reading is unbounded: the liveness check answered with a
/// non-200 status, or the download carried no usable content-length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundSample {
    pub latency_secs: Option<f64>,
    pub throughput_mbps: Option<f64>,
}

impl RoundSample {
    pub fn new(latency_secs: Option<f64>, throughput_mbps: Option<f64>) -> Self {
        Self {
            latency_secs,
            throughput_mbps,
        }
    }
}

/// Final verdict for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResult {
    /// The candidate string exactly as supplied
    pub address: String,
    pub average_latency_secs: Option<f64>,
    pub average_throughput_mbps: Option<f64>,
    pub status: ProxyStatus,
    pub detail: Option<String>,
}

impl ProxyResult {
    pub fn success(address: String, latency_secs: f64, throughput_mbps: f64) -> Self {
        Self {
            address,
            average_latency_secs: Some(latency_secs),
            average_throughput_mbps: Some(throughput_mbps),
            status: ProxyStatus::Success,
            detail: None,
        }
    }

    /// A candidate whose rounds finished but did not yield two finite averages
    pub fn unmeasured(
        address: String,
        latency_secs: Option<f64>,
        throughput_mbps: Option<f64>,
    ) -> Self {
        Self {
            address,
            average_latency_secs: latency_secs,
            average_throughput_mbps: throughput_mbps,
            status: ProxyStatus::Failure,
            detail: Some(ProxyStatus::Failure.to_string()),
        }
    }

    pub fn failed(address: String, error: String) -> Self {
        Self {
            address,
            average_latency_secs: None,
            average_throughput_mbps: None,
            status: ProxyStatus::Failure,
            detail: Some(error),
        }
    }

    pub fn invalid_format(address: String) -> Self {
        Self {
            address,
            average_latency_secs: None,
            average_throughput_mbps: None,
            status: ProxyStatus::InvalidFormat,
            detail: Some(ProxyStatus::InvalidFormat.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProxyStatus::Success
    }

    /// Whether the candidate belongs to the accepted set for `threshold_mbps`
    pub fn meets_threshold(&self, threshold_mbps: f64) -> bool {
        self.is_success()
            && self
                .average_throughput_mbps
                .is_some_and(|mbps| mbps >= threshold_mbps)
    }

    /// Status column text: the detail for failures, the status otherwise
    pub fn status_text(&self) -> String {
        match (&self.status, &self.detail) {
            (ProxyStatus::Success, _) | (_, None) => self.status.to_string(),
            (_, Some(detail)) => detail.clone(),
        }
    }
}

/// Completion counter reported after every finalized result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self { completed, total }
    }

    /// Completed fraction in `[0, 1]`; an empty run counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Outcome of one assessment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub threshold_mbps: f64,
    /// One entry per input candidate, in input order
    pub report: Vec<ProxyResult>,
    /// Accepted addresses, in the order their results were finalized
    pub accepted: Vec<String>,
}

impl Assessment {
    pub fn success_count(&self) -> usize {
        self.report.iter().filter(|r| r.is_success()).count()
    }
}
