//! Repeated rounds against one candidate, folded into a single verdict

use crate::proxy::models::ProxyResult;
use crate::proxy::probe::Probe;
use crate::proxy::validator;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of rounds per candidate
pub const DEFAULT_ROUNDS: usize = 3;

/// Runs a probe several times for one candidate and classifies the outcome
pub struct Sampler<P: Probe> {
    probe: Arc<P>,
    rounds: usize,
}

impl<P: Probe> Clone for Sampler<P> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            rounds: self.rounds,
        }
    }
}

impl<P: Probe> Sampler<P> {
    pub fn new(probe: Arc<P>, rounds: usize) -> Self {
        Self { probe, rounds }
    }

    /// Assess one candidate
    ///
    /// Malformed addresses never touch the network. Rounds run strictly in
    /// sequence and the first failed round fails the candidate.
    pub async fn sample(&self, address: &str) -> ProxyResult {
        if !validator::validate(address) {
            debug!("{}: invalid format, skipping", address);
            return ProxyResult::invalid_format(address.to_string());
        }

        let session = match self.probe.open(address) {
            Ok(session) => session,
            Err(e) => return ProxyResult::failed(address.to_string(), e.to_string()),
        };

        let mut samples = Vec::with_capacity(self.rounds);
        for round in 1..=self.rounds {
            match self.probe.round(&session).await {
                Ok(sample) => {
                    debug!(
                        "{}: round {}/{} latency={:?} throughput={:?}",
                        address, round, self.rounds, sample.latency_secs, sample.throughput_mbps
                    );
                    samples.push(sample);
                }
                Err(e) => {
                    info!("{}: round {}/{} failed: {}", address, round, self.rounds, e);
                    return ProxyResult::failed(address.to_string(), e.to_string());
                }
            }
        }

        let latency = mean(samples.iter().map(|s| s.latency_secs));
        let throughput = mean(samples.iter().map(|s| s.throughput_mbps));

        match (latency, throughput) {
            (Some(latency), Some(throughput)) => {
                info!(
                    "{}: success, {:.3}s latency, {:.3} MB/s",
                    address, latency, throughput
                );
                ProxyResult::success(address.to_string(), latency, throughput)
            }
            (latency, throughput) => {
                info!("{}: unmeasured readings, marking as failure", address);
                ProxyResult::unmeasured(address.to_string(), latency, throughput)
            }
        }
    }
}

/// Arithmetic mean; a single unbounded reading (or no readings) makes it unbounded
fn mean(readings: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for reading in readings {
        sum += reading?;
        count += 1;
    }
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::proxy::models::{ProxyStatus, RoundSample};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays scripted round outcomes in order
    struct ScriptedProbe {
        script: Mutex<Vec<Result<RoundSample, ProbeError>>>,
        opened: AtomicUsize,
        rounds_run: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(mut script: Vec<Result<RoundSample, ProbeError>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                opened: AtomicUsize::new(0),
                rounds_run: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        type Session = ();

        fn open(&self, _address: &str) -> Result<(), ProbeError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn round(&self, _session: &()) -> Result<RoundSample, ProbeError> {
            self.rounds_run.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .expect("script exhausted")
        }
    }

    fn ok(latency: f64, throughput: f64) -> Result<RoundSample, ProbeError> {
        Ok(RoundSample::new(Some(latency), Some(throughput)))
    }

    #[tokio::test]
    async fn test_invalid_format_skips_network() {
        let probe = ScriptedProbe::new(vec![]);
        let sampler = Sampler::new(Arc::clone(&probe), 3);

        let result = sampler.sample("not.an.ip").await;
        assert_eq!(result.status, ProxyStatus::InvalidFormat);
        assert_eq!(result.address, "not.an.ip");
        assert_eq!(probe.opened.load(Ordering::SeqCst), 0);
        assert_eq!(probe.rounds_run.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_averages_all_rounds() {
        let probe = ScriptedProbe::new(vec![ok(0.1, 1.0), ok(0.2, 2.0), ok(0.3, 6.0)]);
        let sampler = Sampler::new(Arc::clone(&probe), 3);

        let result = sampler.sample("10.0.0.1:3128").await;
        assert_eq!(result.status, ProxyStatus::Success);
        assert!((result.average_latency_secs.unwrap() - 0.2).abs() < 1e-12);
        assert!((result.average_throughput_mbps.unwrap() - 3.0).abs() < 1e-12);
        assert!(result.detail.is_none());
        assert_eq!(probe.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_round_error_fails_fast() {
        let probe = ScriptedProbe::new(vec![
            ok(0.1, 1.0),
            Err(ProbeError::Transport("connection refused".to_string())),
            ok(0.3, 3.0),
        ]);
        let sampler = Sampler::new(Arc::clone(&probe), 3);

        let result = sampler.sample("10.0.0.1:3128").await;
        assert_eq!(result.status, ProxyStatus::Failure);
        assert_eq!(result.average_latency_secs, None);
        assert_eq!(result.average_throughput_mbps, None);
        assert_eq!(
            result.detail.as_deref(),
            Some("transport error: connection refused")
        );
        assert_eq!(probe.rounds_run.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_200_liveness_every_round() {
        let unbounded = || -> Result<RoundSample, ProbeError> { Ok(RoundSample::new(None, Some(4.0))) };
        let probe = ScriptedProbe::new(vec![unbounded(), unbounded(), unbounded()]);
        let sampler = Sampler::new(probe, 3);

        let result = sampler.sample("10.0.0.1:3128").await;
        assert_eq!(result.status, ProxyStatus::Failure);
        assert_eq!(result.average_latency_secs, None);
        assert_eq!(result.detail.as_deref(), Some("Failure"));
    }

    #[tokio::test]
    async fn test_single_unbounded_throughput_fails() {
        let probe = ScriptedProbe::new(vec![
            ok(0.1, 1.0),
            Ok(RoundSample::new(Some(0.1), None)),
            ok(0.1, 1.0),
        ]);
        let sampler = Sampler::new(probe, 3);

        let result = sampler.sample("10.0.0.1:3128").await;
        assert_eq!(result.status, ProxyStatus::Failure);
        assert!((result.average_latency_secs.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(result.average_throughput_mbps, None);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(vec![Some(1.0), Some(3.0)].into_iter()), Some(2.0));
        assert_eq!(mean(vec![Some(1.0), None].into_iter()), None);
        assert_eq!(mean(std::iter::empty()), None);
    }
}
