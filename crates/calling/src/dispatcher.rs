//! Batch submission and the caller-facing pending handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::batch::{BatchId, BatchResult};
use crate::correlator::CallCorrelator;
use crate::provider::{BatchCall, CallProvider};
use crate::{Error, Result};

/// Default bound on how long a batch may wait for its callbacks.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30 * 60);

/// Submits call batches and registers their recipients for correlation.
pub struct CallDispatcher<P> {
    provider: P,
    correlator: Arc<CallCorrelator>,
    max_wait: Option<Duration>,
}

impl<P: CallProvider> CallDispatcher<P> {
    pub fn new(provider: P, correlator: Arc<CallCorrelator>) -> Self {
        Self {
            provider,
            correlator,
            max_wait: Some(DEFAULT_MAX_WAIT),
        }
    }

    /// Bound the wait for callbacks; `None` waits until every call reports.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Call every number in `numbers` with `task` and return a handle that
    /// resolves once all of them have reported.
    ///
    /// The batch is registered before the provider is contacted, so a
    /// callback racing the submission response still finds it. If the
    /// submission fails, outlasts the wait bound, or this future is dropped
    /// before it finishes, the registration is withdrawn.
    pub async fn submit(&self, numbers: &[String], task: &str) -> Result<CallHandle> {
        let task = task.trim();
        if task.is_empty() {
            return Err(Error::InvalidRequest("task is empty".into()));
        }

        let registration = self.correlator.register(numbers, task)?;
        let reservation = Reservation {
            correlator: &self.correlator,
            batch_id: registration.batch_id,
            armed: true,
        };

        let call = BatchCall::new(task, &registration.numbers);
        let submission = match self.max_wait {
            Some(wait) => tokio::time::timeout(wait, self.provider.submit_batch(&call))
                .await
                .map_err(|_| Error::DispatchFailed {
                    status: None,
                    body: format!("provider did not answer within {wait:?}"),
                })??,
            None => self.provider.submit_batch(&call).await?,
        };
        reservation.keep();

        info!(
            batch_id = %registration.batch_id,
            provider_batch_id = submission.id.as_deref().unwrap_or("-"),
            dispatched = submission.total_calls_dispatched,
            scheduled = submission.total_calls_scheduled,
            "batch submitted"
        );

        let deadline = self.max_wait.map(|wait| {
            let correlator = Arc::clone(&self.correlator);
            let batch_id = registration.batch_id;
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                if correlator.expire(batch_id) {
                    warn!(%batch_id, ?wait, "gave up waiting for call results");
                }
            })
        });

        Ok(CallHandle {
            batch_id: registration.batch_id,
            provider_batch_id: submission.id,
            completion: registration.completion,
            deadline,
            max_wait: self.max_wait,
        })
    }
}

/// Withdraws a registration unless the submission went through.
struct Reservation<'a> {
    correlator: &'a CallCorrelator,
    batch_id: BatchId,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.correlator.abandon(self.batch_id);
        }
    }
}

/// Pending result of a submitted batch.
///
/// Dropping the handle does not cancel anything: the batch still completes
/// or expires and is then discarded.
#[derive(Debug)]
pub struct CallHandle {
    batch_id: BatchId,
    provider_batch_id: Option<String>,
    completion: oneshot::Receiver<BatchResult>,
    deadline: Option<JoinHandle<()>>,
    max_wait: Option<Duration>,
}

impl CallHandle {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn provider_batch_id(&self) -> Option<&str> {
        self.provider_batch_id.as_deref()
    }

    /// Wait for every call in the batch to report.
    ///
    /// Fails with `Timeout` when the batch was evicted before completing.
    pub async fn wait(mut self) -> Result<BatchResult> {
        let received = (&mut self.completion).await;
        if let Some(deadline) = self.deadline.take() {
            deadline.abort();
        }

        match received {
            Ok(mut result) => {
                result.provider_batch_id = self.provider_batch_id.take();
                Ok(result)
            }
            Err(_) => Err(Error::Timeout {
                batch_id: self.batch_id,
                waited: self.max_wait.unwrap_or_default(),
            }),
        }
    }
}
