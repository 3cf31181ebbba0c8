//! Bounded-concurrency dispatcher
//!
//! Pulls specs lazily from the resolver, runs at most `concurrency` probes at
//! once, sends every attempt through the shared rate gate and ships each
//! finished result to a single consumer over a channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::endpoints::{Endpoint, EndpointPool, Selection};
use super::rate::RateGate;
use super::retry::RetryPolicy;
use super::transport::Transport;
use crate::error::TransportError;
use crate::probe::{HttpSnapshot, ProbeResult, ProbeSpec, SuccessCriteria};

/// A finished probe as delivered to the consumer
pub type Completed = (ProbeSpec, ProbeResult);

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Maximum probes in flight
    pub concurrency: usize,
    /// Global attempt starts per second, `None` for unlimited
    pub rate_per_second: Option<f64>,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub success: SuccessCriteria,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            rate_per_second: None,
            timeout: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
            success: SuccessCriteria::default(),
        }
    }
}

/// Cooperative stop signal, checked before each new probe starts
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one dispatch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Probes started
    pub started: u64,
    /// Attempts sent, retries included
    pub attempts: u64,
    /// Stopped before the probe space was exhausted
    pub cancelled: bool,
    /// Every endpoint failed and rotation was abandoned
    pub no_endpoints_available: bool,
}

struct Worker<T> {
    transport: Arc<T>,
    pool: Arc<EndpointPool>,
    gate: RateGate,
    timeout: Duration,
    retry: RetryPolicy,
    success: SuccessCriteria,
    attempts: AtomicU64,
    no_endpoints: AtomicBool,
}

impl<T: Transport> Worker<T> {
    fn pick_endpoint(&self) -> Option<(usize, Endpoint)> {
        match self.pool.select() {
            Selection::Endpoint { index, endpoint } => Some((index, endpoint)),
            Selection::Direct => None,
            Selection::Exhausted => {
                if !self.no_endpoints.swap(true, Ordering::SeqCst) {
                    tracing::warn!("All endpoints have failed, continuing without rotation");
                }
                None
            }
        }
    }

    /// Send one attempt. The returned latency starts once the rate gate has
    /// released the attempt, so queueing for a token is never counted.
    async fn attempt(
        &self,
        spec: &ProbeSpec,
        endpoint: Option<&Endpoint>,
    ) -> (Result<HttpSnapshot, TransportError>, Duration) {
        self.gate.until_ready().await;
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.transport.send(spec, endpoint)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::timeout(self.timeout.as_millis() as u64)),
        };
        (outcome, started.elapsed())
    }

    /// Take an endpoint out of rotation after its first failure
    fn retire(&self, picked: &Option<(usize, Endpoint)>, err: &TransportError) {
        if let Some((index, endpoint)) = picked {
            if self.pool.mark_failed(*index) {
                tracing::warn!(endpoint = %endpoint.url, error = %err, "Endpoint marked failed");
            }
        }
    }

    /// Run one probe to completion: attempts, retries and endpoint bookkeeping.
    ///
    /// A failing endpoint is retired as soon as one attempt through it fails;
    /// the retry then goes through the next alive endpoint.
    async fn execute(&self, spec: &ProbeSpec) -> ProbeResult {
        let mut picked = self.pick_endpoint();

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let endpoint = picked.as_ref().map(|(_, e)| e);
            let (outcome, latency) = self.attempt(spec, endpoint).await;

            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        spec_id = spec.id,
                        status = response.status,
                        attempt,
                        "Probe completed"
                    );
                    return ProbeResult::from_response(
                        spec,
                        response,
                        latency,
                        attempt,
                        endpoint.map(|e| e.url.clone()),
                        &self.success,
                    );
                }
                Err(err) if self.retry.allows_retry(attempt) => {
                    self.retire(&picked, &err);
                    let delay = self.retry.backoff_for(attempt);
                    tracing::warn!(
                        spec_id = spec.id,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    if picked.is_some() {
                        picked = self.pick_endpoint();
                    }
                }
                Err(err) => {
                    self.retire(&picked, &err);
                    tracing::debug!(spec_id = spec.id, attempt, error = %err, "Probe failed");
                    let label = endpoint.map(|e| e.url.clone());
                    return ProbeResult::from_error(spec, err, latency, attempt, label);
                }
            }
        }
    }
}

/// Executes probe specs against a transport
pub struct Dispatcher<T> {
    worker: Arc<Worker<T>>,
    concurrency: usize,
    stop: StopHandle,
}

impl<T: Transport + 'static> Dispatcher<T> {
    pub fn new(config: DispatchConfig, transport: Arc<T>, pool: Arc<EndpointPool>) -> Self {
        let worker = Worker {
            transport,
            pool,
            gate: RateGate::new(config.rate_per_second),
            timeout: config.timeout,
            retry: config.retry,
            success: config.success,
            attempts: AtomicU64::new(0),
            no_endpoints: AtomicBool::new(false),
        };

        Self {
            worker: Arc::new(worker),
            concurrency: config.concurrency.clamp(1, Semaphore::MAX_PERMITS),
            stop: StopHandle::new(),
        }
    }

    /// Use an externally owned stop signal
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.worker.pool
    }

    /// Dispatch every spec, sending each finished probe to `sink`.
    ///
    /// Returns once all started probes have finished. Probes in flight when
    /// the stop signal fires still complete and are delivered.
    pub async fn run<I>(&self, specs: I, sink: mpsc::Sender<Completed>) -> DispatchStats
    where
        I: IntoIterator<Item = ProbeSpec>,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut specs = specs.into_iter();
        let mut started = 0u64;
        let mut cancelled = false;

        loop {
            // The permit is taken before the next spec is pulled, so the
            // resolver is never ahead of available capacity.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            if self.stop.is_stopped() {
                cancelled = specs.next().is_some();
                break;
            }

            let Some(spec) = specs.next() else {
                break;
            };

            while let Some(joined) = tasks.try_join_next() {
                log_join_error(joined);
            }

            started += 1;
            let worker = self.worker.clone();
            let sink = sink.clone();
            tasks.spawn(async move {
                let result = worker.execute(&spec).await;
                if sink.send((spec, result)).await.is_err() {
                    tracing::debug!("Result consumer closed, dropping result");
                }
                drop(permit);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            log_join_error(joined);
        }

        if cancelled {
            tracing::info!(started, "Dispatch stopped before the probe space was exhausted");
        }

        DispatchStats {
            started,
            attempts: self.worker.attempts.load(Ordering::Relaxed),
            cancelled,
            no_endpoints_available: self.worker.no_endpoints.load(Ordering::SeqCst),
        }
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(err) = joined {
        tracing::error!(error = %err, "Probe task failed");
    }
}
