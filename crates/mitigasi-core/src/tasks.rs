//! Fire-and-forget background work with reported outcomes.
//!
//! Long-running background work (the event publisher's worker) runs under
//! [`spawn_reported`]. Every task and every publish sends a [`TaskOutcome`]
//! on a channel that a single reporter task drains and logs.

use std::fmt::Display;
use std::future::Future;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default capacity of the outcome channel.
pub const DEFAULT_OUTCOME_CAPACITY: usize = 256;

/// Result of one background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// What the task was doing (e.g. `publish INCIDENT_CREATED`).
    pub label: String,
    /// `Err` carries the rendered failure.
    pub result: Result<(), String>,
}

/// Sending half handed to whoever spawns background work.
pub type OutcomeSender = mpsc::Sender<TaskOutcome>;

/// Create an outcome channel.
pub fn outcome_channel(capacity: usize) -> (OutcomeSender, mpsc::Receiver<TaskOutcome>) {
    mpsc::channel(capacity)
}

/// Run `task` in the background and report how it ended.
pub fn spawn_reported<F, E>(
    label: impl Into<String>,
    task: F,
    outcomes: OutcomeSender,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send,
{
    let label = label.into();
    tokio::spawn(async move {
        let result = task.await;
        report(&outcomes, label, result).await;
    })
}

/// Send one outcome, waiting for room on the channel.
pub async fn report<E: Display>(
    outcomes: &OutcomeSender,
    label: impl Into<String>,
    result: Result<(), E>,
) {
    let outcome = TaskOutcome {
        label: label.into(),
        result: result.map_err(|e| e.to_string()),
    };
    if outcomes.send(outcome).await.is_err() {
        debug!("Outcome reporter has stopped");
    }
}

/// Send one outcome without waiting. Logged instead when the channel is full.
pub fn report_now<E: Display>(
    outcomes: &OutcomeSender,
    label: impl Into<String>,
    result: Result<(), E>,
) {
    let outcome = TaskOutcome {
        label: label.into(),
        result: result.map_err(|e| e.to_string()),
    };
    match outcomes.try_send(outcome) {
        Ok(()) => {}
        Err(TrySendError::Full(outcome)) => {
            warn!(task = %outcome.label, result = ?outcome.result, "Outcome channel full, outcome not reported");
        }
        Err(TrySendError::Closed(_)) => debug!("Outcome reporter has stopped"),
    }
}

/// Totals seen by a reporter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally {
    /// Tasks that finished with `Ok`.
    pub succeeded: u64,
    /// Tasks that finished with `Err`.
    pub failed: u64,
}

/// Log every outcome until all senders are dropped.
pub async fn report_outcomes(mut outcomes: mpsc::Receiver<TaskOutcome>) -> OutcomeTally {
    let mut tally = OutcomeTally::default();
    while let Some(outcome) = outcomes.recv().await {
        match outcome.result {
            Ok(()) => {
                tally.succeeded = tally.succeeded.saturating_add(1);
                debug!(task = %outcome.label, "Background task completed");
            }
            Err(error) => {
                tally.failed = tally.failed.saturating_add(1);
                warn!(task = %outcome.label, %error, "Background task failed");
            }
        }
    }
    tally
}

/// Spawn [`report_outcomes`] on its own task.
pub fn spawn_reporter(outcomes: mpsc::Receiver<TaskOutcome>) -> JoinHandle<OutcomeTally> {
    tokio::spawn(report_outcomes(outcomes))
}
