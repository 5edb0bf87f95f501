//! Bulk assessment of candidate proxies over a bounded worker pool

use crate::error::AssessError;
use crate::proxy::models::{Assessment, Progress, ProxyResult};
use crate::proxy::probe::{HttpProbe, Probe, ProbeConfig};
use crate::proxy::sampler::{Sampler, DEFAULT_ROUNDS};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::info;
use uuid::Uuid;

/// Default minimum average download speed in MB/s
const DEFAULT_THRESHOLD_MBPS: f64 = 1.0;

/// Default number of candidates assessed at once
const DEFAULT_CONCURRENCY: usize = 10;

/// Configuration for an assessment run
#[derive(Debug, Clone, PartialEq)]
pub struct AssessConfig {
    /// Minimum average throughput for a candidate to be accepted
    pub threshold_mbps: f64,
    /// Probe rounds per candidate
    pub rounds: usize,
    /// Number of candidates assessed concurrently
    pub concurrency: usize,
    /// Endpoints, timeouts and retries for each round
    pub probe: ProbeConfig,
}

impl Default for AssessConfig {
    fn default() -> Self {
        Self {
            threshold_mbps: DEFAULT_THRESHOLD_MBPS,
            rounds: DEFAULT_ROUNDS,
            concurrency: DEFAULT_CONCURRENCY,
            probe: ProbeConfig::default(),
        }
    }
}

impl AssessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold_mbps: f64) -> Self {
        self.threshold_mbps = threshold_mbps;
        self
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    pub fn validate(&self) -> Result<(), AssessError> {
        if self.threshold_mbps.is_nan() || self.threshold_mbps < 0.0 {
            return Err(AssessError::InvalidConfig(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold_mbps
            )));
        }
        if self.rounds == 0 {
            return Err(AssessError::InvalidConfig(
                "rounds must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AssessError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle to a spawned worker that aborts the task when dropped
///
/// Leaving a run early (worker failure, or the run itself being aborted)
/// drops the pending handles, which must not leave workers running.
struct WorkerHandle<T>(JoinHandle<T>);

impl<T> Future for WorkerHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for WorkerHandle<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Fans candidates out to samplers and collects one verdict per candidate
pub struct Assessor<P: Probe = HttpProbe> {
    config: AssessConfig,
    sampler: Sampler<P>,
}

impl Assessor<HttpProbe> {
    /// Create an assessor with default configuration
    pub fn new() -> Self {
        Self::with_config(AssessConfig::default())
    }

    /// Create an assessor probing over HTTP with custom configuration
    pub fn with_config(config: AssessConfig) -> Self {
        let probe = HttpProbe::new(config.probe.clone());
        Self::with_probe(config, probe)
    }
}

impl Default for Assessor<HttpProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Probe> Clone for Assessor<P> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            sampler: self.sampler.clone(),
        }
    }
}

impl<P: Probe + 'static> Assessor<P> {
    /// Create an assessor around any probe implementation
    pub fn with_probe(config: AssessConfig, probe: P) -> Self {
        let sampler = Sampler::new(Arc::new(probe), config.rounds);
        Self { config, sampler }
    }

    /// Assess all candidates
    pub async fn assess(&self, candidates: Vec<String>) -> Result<Assessment, AssessError> {
        self.assess_with_progress(candidates, |_, _| {}).await
    }

    /// Assess all candidates, reporting each verdict as it is finalized
    ///
    /// `on_result` sees results in completion order together with the
    /// progress after that result. The returned report is in input order.
    pub async fn assess_with_progress<F>(
        &self,
        candidates: Vec<String>,
        mut on_result: F,
    ) -> Result<Assessment, AssessError>
    where
        F: FnMut(&ProxyResult, Progress),
    {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let total = candidates.len();
        let threshold = self.config.threshold_mbps;

        info!(
            "Run {}: assessing {} candidates ({} workers, {} rounds, threshold {} MB/s)",
            run_id, total, self.config.concurrency, self.config.rounds, threshold
        );

        let mut slots: Vec<Option<ProxyResult>> = vec![None; total];
        let mut accepted = Vec::new();
        let mut completed = 0;

        let mut verdicts = stream::iter(candidates.into_iter().enumerate())
            .map(|(index, address)| {
                let sampler = self.sampler.clone();
                WorkerHandle(tokio::spawn(async move {
                    (index, sampler.sample(&address).await)
                }))
            })
            .buffer_unordered(self.config.concurrency);

        while let Some(joined) = verdicts.next().await {
            let (index, result) = joined.map_err(|e| AssessError::Worker(e.to_string()))?;
            completed += 1;

            if result.meets_threshold(threshold) {
                accepted.push(result.address.clone());
            }
            on_result(&result, Progress::new(completed, total));
            slots[index] = Some(result);
        }

        let report = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AssessError::Worker("a candidate produced no result".to_string()))?;

        let assessment = Assessment {
            run_id,
            started_at,
            finished_at: Utc::now(),
            threshold_mbps: threshold,
            report,
            accepted,
        };

        info!(
            "Run {}: {} succeeded, {} accepted out of {}",
            run_id,
            assessment.success_count(),
            assessment.accepted.len(),
            total
        );

        Ok(assessment)
    }

    /// Run the assessment in the background, streaming verdicts as they land
    ///
    /// The receiver closes once every candidate has a result; the handle
    /// resolves to the final assessment.
    pub fn assess_stream(
        &self,
        candidates: Vec<String>,
    ) -> (
        mpsc::UnboundedReceiver<(ProxyResult, Progress)>,
        JoinHandle<Result<Assessment, AssessError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let assessor = self.clone();

        let handle = tokio::spawn(async move {
            assessor
                .assess_with_progress(candidates, move |result, progress| {
                    // The receiver may be gone if the viewer quit early.
                    let _ = tx.send((result.clone(), progress));
                })
                .await
        });

        (rx, handle)
    }
}
