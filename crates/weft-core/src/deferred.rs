//! Deferred relationship resolution.
//!
//! File workers push [`DeferredFact`]s through cloned [`DeferredQueue`]
//! handles while extraction is running. Once extraction is done the run
//! calls [`DeferredResolver::flush`], which retries failed items in rounds
//! with exponential backoff between them:
//!
//! 1. drain whatever is queued right now into the round's batch
//! 2. for each item, synthesize the target node if needed, then merge the edge
//! 3. put failures back for the next round
//!
//! Items that still fail when the round budget is spent are reported, not
//! raised. The report always satisfies `written + pending == received`.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::facts::DeferredFact;
use crate::graph::{GraphClient, GraphError};
use crate::retry::{CancelToken, RetryPolicy};

/// Pending items described in the report, at most.
const REPORTED_PENDING: usize = 20;

/// Why one deferred relationship could not be written in a round.
#[derive(Debug, Error)]
pub enum DeferredWriteError {
    #[error("Store rejected the write: {0}")]
    Store(#[from] GraphError),

    #[error("Endpoint {0} does not exist yet")]
    MissingEndpoint(String),
}

/// Producer handle; clone one into every worker.
#[derive(Debug, Clone)]
pub struct DeferredQueue {
    tx: mpsc::UnboundedSender<DeferredFact>,
}

impl DeferredQueue {
    pub fn push(&self, fact: DeferredFact) {
        // The resolver owns a sender too, so the channel outlives every producer.
        if self.tx.send(fact).is_err() {
            warn!("Deferred resolver dropped, relationship discarded");
        }
    }

    pub fn extend(&self, facts: impl IntoIterator<Item = DeferredFact>) {
        for fact in facts {
            self.push(fact);
        }
    }
}

/// Outcome of a flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Relationships taken off the queue.
    pub received: usize,
    /// Relationships written.
    pub written: usize,
    /// Relationships still unwritten after the round budget.
    pub pending: usize,
    /// Rounds actually run.
    pub rounds: u32,
    /// Sample of the pending relationships with their last error.
    pub pending_sample: Vec<String>,
}

/// Single consumer of the deferred queue.
pub struct DeferredResolver {
    tx: mpsc::UnboundedSender<DeferredFact>,
    rx: mpsc::UnboundedReceiver<DeferredFact>,
    policy: RetryPolicy,
}

impl DeferredResolver {
    /// `policy.max_attempts` is the round budget.
    pub fn new(policy: RetryPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx, policy }
    }

    pub fn queue(&self) -> DeferredQueue {
        DeferredQueue {
            tx: self.tx.clone(),
        }
    }

    /// Write every buffered relationship, retrying failures for up to the
    /// round budget.
    pub async fn flush(mut self, client: &GraphClient, cancel: &CancelToken) -> FlushReport {
        let mut report = FlushReport::default();
        let mut backlog: Vec<(DeferredFact, Option<DeferredWriteError>)> = Vec::new();

        loop {
            report.received += self.drain_into(&mut backlog);
            if backlog.is_empty() || report.rounds >= self.policy.max_attempts {
                break;
            }
            if report.rounds > 0 {
                let delay = self.policy.delay_after(report.rounds);
                debug!(round = report.rounds + 1, pending = backlog.len(), delay_ms = delay.as_millis() as u64, "Backing off before next flush round");
                if !cancel.sleep(delay).await {
                    warn!("Deferred flush cancelled");
                    break;
                }
            }
            report.rounds += 1;

            let batch = std::mem::take(&mut backlog);
            for (fact, _) in batch {
                match resolve(client, &fact).await {
                    Ok(()) => report.written += 1,
                    Err(e) => {
                        debug!(source = %fact.source, relationship = %fact.relationship, error = %e, "Deferred write failed, requeued");
                        backlog.push((fact, Some(e)));
                    }
                }
            }
            info!(round = report.rounds, written = report.written, remaining = backlog.len(), "Deferred flush round finished");
        }

        report.pending = backlog.len();
        report.pending_sample = backlog
            .iter()
            .take(REPORTED_PENDING)
            .map(|(fact, error)| match error {
                Some(error) => format!("{} -[:{}]-> {:?}: {}", fact.source, fact.relationship, fact.target, error),
                None => format!("{} -[:{}]-> {:?}: never attempted", fact.source, fact.relationship, fact.target),
            })
            .collect();

        if report.pending > 0 {
            warn!(pending = report.pending, written = report.written, rounds = report.rounds, "Deferred relationships left unwritten");
        }
        report
    }

    fn drain_into(&mut self, backlog: &mut Vec<(DeferredFact, Option<DeferredWriteError>)>) -> usize {
        let mut drained = 0;
        while let Ok(fact) = self.rx.try_recv() {
            backlog.push((fact, None));
            drained += 1;
        }
        drained
    }
}

async fn resolve(client: &GraphClient, fact: &DeferredFact) -> Result<(), DeferredWriteError> {
    let (target, synthesized) = fact.target.materialize();
    if let Some(properties) = synthesized {
        client.upsert_node(&target, properties).await?;
    }
    if client.upsert_edge(&fact.source, &target, fact.relationship).await? {
        Ok(())
    } else {
        Err(DeferredWriteError::MissingEndpoint(format!("{} or {}", fact.source, target)))
    }
}
