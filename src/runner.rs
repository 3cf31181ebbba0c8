//! Module runner
//!
//! Wires the resolver, dispatcher, classifier and aggregator together for one
//! module run. Results flow from the dispatcher over a channel to a single
//! consumer that classifies and records them.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::app::ModulePlan;
use crate::dispatch::{Completed, Dispatcher, EndpointPool, ReqwestTransport, StopHandle, Transport};
use crate::error::ProbeError;
use crate::reporting::checkpoint::Checkpointer;
use crate::reporting::{Aggregator, RunReport};

/// Runs one resolved module plan
pub struct Runner<T> {
    plan: ModulePlan,
    transport: Arc<T>,
    stop: StopHandle,
    checkpoint: Option<Checkpointer>,
}

impl Runner<ReqwestTransport> {
    /// Runner over the real HTTP transport
    pub fn from_plan(plan: ModulePlan) -> Result<Self, ProbeError> {
        let transport = ReqwestTransport::new(&plan.transport, &plan.endpoints)?;
        Ok(Self::with_transport(plan, Arc::new(transport)))
    }
}

impl<T: Transport + 'static> Runner<T> {
    pub fn with_transport(plan: ModulePlan, transport: Arc<T>) -> Self {
        Self {
            plan,
            transport,
            stop: StopHandle::new(),
            checkpoint: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpointer) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Share a stop signal owned elsewhere
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Signal that stops the run before the next probe starts
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Execute the plan and return the finalized report.
    ///
    /// Per-probe failures end up in the report; only report bookkeeping
    /// errors are returned.
    pub async fn run(self) -> Result<RunReport, ProbeError> {
        let ModulePlan {
            module,
            space,
            dispatch,
            endpoints,
            classifier,
            ..
        } = self.plan;

        tracing::info!(
            module = %module,
            url = %space.target(),
            probes = space.len(),
            concurrency = dispatch.concurrency,
            rate = ?dispatch.rate_per_second,
            endpoints = endpoints.len(),
            "Starting run"
        );

        let aggregator = Arc::new(Aggregator::new(module, space.target().as_str()));
        let pool = Arc::new(EndpointPool::new(endpoints));
        let buffer = dispatch.concurrency.max(1).saturating_mul(2);
        let dispatcher = Dispatcher::new(dispatch, self.transport, pool.clone())
            .with_stop_handle(self.stop.clone());

        let checkpoint_task = self
            .checkpoint
            .clone()
            .map(|checkpoint| checkpoint.spawn(aggregator.clone()));

        let (tx, mut rx) = mpsc::channel::<Completed>(buffer);
        let consumer = {
            let aggregator = aggregator.clone();
            tokio::spawn(async move {
                while let Some((spec, result)) = rx.recv().await {
                    let findings = classifier.classify(&result, &spec);
                    for finding in &findings {
                        tracing::info!(
                            spec_id = finding.spec_id,
                            kind = %finding.kind,
                            severity = %finding.severity,
                            probe = %spec.target_label(),
                            "Finding"
                        );
                    }
                    if let Err(e) = aggregator.record(spec, result, findings) {
                        tracing::error!(error = %e, "Failed to record result");
                    }
                }
            })
        };

        let stats = dispatcher.run(space.iter(), tx).await;

        if let Err(e) = consumer.await {
            tracing::error!(error = %e, "Result consumer failed");
        }
        if let Some(task) = checkpoint_task {
            task.finish().await;
        }

        let failed_endpoints: Vec<String> = pool.failed().into_iter().map(|e| e.url).collect();
        aggregator.record_endpoints(stats.no_endpoints_available, failed_endpoints)?;
        if stats.cancelled {
            aggregator.mark_cancelled()?;
        }

        let report = aggregator.finalize()?;

        if let Some(checkpoint) = &self.checkpoint {
            checkpoint.persist(report.clone()).await?;
        }

        tracing::info!(
            attempted = report.summary.attempted,
            succeeded = report.summary.succeeded,
            failed = report.summary.failed,
            findings = report.summary.findings_total,
            attempts_sent = stats.attempts,
            duration_ms = report.metadata.duration_ms,
            cancelled = report.metadata.cancelled,
            "Run complete"
        );

        Ok(report)
    }
}
