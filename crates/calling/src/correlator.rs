//! In-memory correlation of call callbacks with their batches.
//!
//! A callback identifies its call only by phone number, so a number may be
//! pending in at most one live batch. The table keeps the live batches and a
//! number index over them; each batch guards its own mutable state so
//! callbacks for different batches never contend beyond the index lookup.
//! Locks are never held across each other: batch state is released before
//! the table is touched again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::batch::{BatchId, BatchResult, CallOutcome};
use crate::{Error, Result};

/// What happened to a recorded completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Matched; the batch still waits on `remaining` numbers.
    Pending { batch_id: BatchId, remaining: usize },
    /// Matched the last outstanding number; the batch has been resolved.
    Completed { batch_id: BatchId },
    /// The number already reported in this batch; ignored.
    Duplicate { batch_id: BatchId },
    /// No live batch is waiting on this number; ignored.
    Unmatched,
}

/// A freshly registered batch: its id, the distinct recipients, and the
/// receiving end of its completion.
#[derive(Debug)]
pub struct Registration {
    pub batch_id: BatchId,
    pub numbers: Vec<String>,
    pub completion: oneshot::Receiver<BatchResult>,
}

#[derive(Debug)]
struct BatchState {
    pending: HashSet<String>,
    collected: Vec<CallOutcome>,
    /// `None` once the batch has been resolved or evicted.
    completion: Option<oneshot::Sender<BatchResult>>,
}

#[derive(Debug)]
struct CallBatch {
    id: BatchId,
    task: String,
    numbers: Vec<String>,
    state: Mutex<BatchState>,
}

#[derive(Debug, Default)]
struct Table {
    batches: HashMap<BatchId, Arc<CallBatch>>,
    by_number: HashMap<String, BatchId>,
}

/// Maps arriving call results to their batch and resolves a batch once
/// every recipient has reported.
///
/// Purely event driven: it has no timers. Bounding a batch's lifetime is up
/// to the owner, through [`CallCorrelator::expire`].
#[derive(Debug, Default)]
pub struct CallCorrelator {
    table: RwLock<Table>,
}

impl CallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch for `numbers`. Blank entries are dropped and
    /// duplicates collapse to a single pending entry.
    ///
    /// Fails with `InvalidRequest` when nothing is left to call, and with
    /// `RecipientInFlight` when a number is pending in another live batch.
    pub fn register<I, S>(&self, numbers: I, task: &str) -> Result<Registration>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut distinct = Vec::new();
        let mut pending = HashSet::new();
        for number in numbers {
            let number = number.as_ref().trim();
            if !number.is_empty() && pending.insert(number.to_string()) {
                distinct.push(number.to_string());
            }
        }

        if distinct.is_empty() {
            return Err(Error::InvalidRequest("no phone numbers to call".into()));
        }

        let (tx, rx) = oneshot::channel();
        let batch = Arc::new(CallBatch {
            id: BatchId::new(),
            task: task.to_string(),
            numbers: distinct.clone(),
            state: Mutex::new(BatchState {
                pending,
                collected: Vec::with_capacity(distinct.len()),
                completion: Some(tx),
            }),
        });

        let mut table = self.table.write();
        if let Some(busy) = distinct.iter().find(|n| table.by_number.contains_key(*n)) {
            return Err(Error::RecipientInFlight(busy.clone()));
        }
        for number in &distinct {
            table.by_number.insert(number.clone(), batch.id);
        }
        table.batches.insert(batch.id, Arc::clone(&batch));
        drop(table);

        debug!(batch_id = %batch.id, recipients = distinct.len(), "batch registered");
        Ok(Registration {
            batch_id: batch.id,
            numbers: distinct,
            completion: rx,
        })
    }

    /// Record the outcome of one finished call.
    ///
    /// Never fails: unknown numbers and repeated reports are logged and
    /// ignored, leaving every live batch untouched.
    pub fn record_completion(&self, outcome: CallOutcome) -> Correlation {
        let number = outcome.phone_number.trim().to_string();

        let batch = {
            let table = self.table.read();
            table
                .by_number
                .get(&number)
                .and_then(|id| table.batches.get(id))
                .cloned()
        };
        let Some(batch) = batch else {
            warn!(phone = %number, "callback for a number with no live batch");
            return Correlation::Unmatched;
        };

        let mut state = batch.state.lock();
        if state.completion.is_none() {
            // Resolved or evicted between the lookup and the lock.
            warn!(phone = %number, batch_id = %batch.id, "callback for a closed batch");
            return Correlation::Unmatched;
        }
        if !state.pending.remove(&number) {
            debug!(phone = %number, batch_id = %batch.id, "duplicate callback ignored");
            return Correlation::Duplicate { batch_id: batch.id };
        }

        state.collected.push(CallOutcome {
            phone_number: number.clone(),
            ..outcome
        });

        let remaining = state.pending.len();
        if remaining > 0 {
            info!(phone = %number, batch_id = %batch.id, remaining, "call completed");
            return Correlation::Pending {
                batch_id: batch.id,
                remaining,
            };
        }

        let sender = state.completion.take();
        let outcomes = std::mem::take(&mut state.collected);
        drop(state);

        self.unlink(&batch);
        info!(batch_id = %batch.id, calls = outcomes.len(), "batch completed");

        let result = BatchResult::new(batch.id, batch.task.clone(), outcomes);
        if let Some(tx) = sender {
            if tx.send(result).is_err() {
                debug!(batch_id = %batch.id, "nobody waiting on completed batch");
            }
        }

        Correlation::Completed { batch_id: batch.id }
    }

    /// Evict a batch whose wait deadline has passed. Its pending handle
    /// observes the closed channel; later callbacks are unmatched.
    ///
    /// Returns `false` if the batch was no longer live.
    pub fn expire(&self, batch_id: BatchId) -> bool {
        let evicted = self.evict(batch_id);
        if let Some(pending) = &evicted {
            warn!(%batch_id, ?pending, "batch expired with calls outstanding");
        }
        evicted.is_some()
    }

    /// Drop a batch whose submission failed. Returns `false` if it was no
    /// longer live.
    pub fn abandon(&self, batch_id: BatchId) -> bool {
        let evicted = self.evict(batch_id);
        if evicted.is_some() {
            debug!(%batch_id, "batch abandoned");
        }
        evicted.is_some()
    }

    /// Number of batches still waiting on callbacks.
    pub fn live_batches(&self) -> usize {
        self.table.read().batches.len()
    }

    /// Whether `number` is awaiting a callback in some live batch.
    pub fn is_pending(&self, number: &str) -> bool {
        self.table.read().by_number.contains_key(number.trim())
    }

    /// Close a live batch and return the numbers it was still waiting on.
    fn evict(&self, batch_id: BatchId) -> Option<Vec<String>> {
        let batch = self.table.read().batches.get(&batch_id).cloned()?;

        let mut state = batch.state.lock();
        let sender = state.completion.take()?;
        let mut pending: Vec<String> = state.pending.drain().collect();
        state.collected.clear();
        drop(state);

        self.unlink(&batch);
        drop(sender);

        pending.sort();
        Some(pending)
    }

    fn unlink(&self, batch: &CallBatch) {
        let mut table = self.table.write();
        table.batches.remove(&batch.id);
        for number in &batch.numbers {
            if table.by_number.get(number) == Some(&batch.id) {
                table.by_number.remove(number);
            }
        }
    }
}
