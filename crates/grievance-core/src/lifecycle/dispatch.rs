//! Best-effort background work that follows a committed write.
//!
//! Tasks are delivered at most once. Enqueue and handler failures are logged by the
//! dispatcher and never reach the caller that produced the task.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::domain::CaseId;
use super::repository::{
    DirectoryError, HookError, IdentityDirectory, IntegrationHook, LifecycleStore,
    NotificationError, NotificationSender, RepositoryError, SignalSet,
};
use super::signals::{webhook_payload, SignalDetector};
use super::timeline::TimelineEvent;

/// Message for the people attached to a case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub case_id: CaseId,
    /// User ids resolved through the identity directory at delivery time.
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundTask {
    /// Recompute as of the write that triggered it.
    RecomputeSignals {
        case_id: CaseId,
        as_of: DateTime<Utc>,
    },
    Notify(Notification),
    PushTimeline(TimelineEvent),
}

impl BackgroundTask {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RecomputeSignals { .. } => "recompute_signals",
            Self::Notify(_) => "notify",
            Self::PushTimeline(_) => "push_timeline",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("background queue is full")]
    QueueFull,
    #[error("background queue is closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
}

pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: BackgroundTask) -> Result<(), TaskError>;
}

pub trait TaskDispatcher: Send + Sync {
    fn dispatch(&self, task: BackgroundTask) -> Result<(), DispatchError>;
}

fn run_logged(handler: &dyn TaskHandler, task: BackgroundTask) {
    let label = task.label();
    if let Err(err) = handler.handle(task) {
        warn!(task = label, error = %err, "background task failed");
    }
}

/// Runs each task on the caller's thread before returning.
pub struct InlineDispatcher {
    handler: Arc<dyn TaskHandler>,
}

impl InlineDispatcher {
    pub fn new(handler: Arc<dyn TaskHandler>) -> Self {
        Self { handler }
    }
}

impl TaskDispatcher for InlineDispatcher {
    fn dispatch(&self, task: BackgroundTask) -> Result<(), DispatchError> {
        run_logged(self.handler.as_ref(), task);
        Ok(())
    }
}

/// Bounded queue drained by a single tokio worker. Tasks are dropped when the queue is
/// full rather than applying backpressure to the write path.
#[derive(Clone)]
pub struct QueueDispatcher {
    sender: mpsc::Sender<BackgroundTask>,
}

impl QueueDispatcher {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn(handler: Arc<dyn TaskHandler>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<BackgroundTask>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                run_logged(handler.as_ref(), task);
            }
            debug!("background queue drained");
        });
        (Self { sender }, worker)
    }
}

impl TaskDispatcher for QueueDispatcher {
    fn dispatch(&self, task: BackgroundTask) -> Result<(), DispatchError> {
        self.sender.try_send(task).map_err(|err| match err {
            mpsc::error::TrySendError::Full(task) => {
                warn!(task = task.label(), "background queue full, dropping task");
                DispatchError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }
}

/// Executes background tasks against the store and outbound adapters.
pub struct LifecycleTaskHandler<S> {
    store: Arc<S>,
    detector: SignalDetector,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn NotificationSender>,
    integration: Arc<dyn IntegrationHook>,
}

impl<S> LifecycleTaskHandler<S>
where
    S: LifecycleStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        detector: SignalDetector,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSender>,
        integration: Arc<dyn IntegrationHook>,
    ) -> Self {
        Self {
            store,
            detector,
            directory,
            notifier,
            integration,
        }
    }

    /// Recomputes and stores the case's signals, returning the new set.
    pub fn recompute(
        &self,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<SignalSet, TaskError> {
        let case = self
            .store
            .fetch(case_id)?
            .ok_or_else(|| TaskError::CaseNotFound(case_id.clone()))?;
        let timeline = self.store.events_for_case(case_id)?;
        let signals = self.detector.detect(&case, &timeline, now);
        debug!(case = %case_id, count = signals.len(), "signals recomputed");

        let set = SignalSet {
            case_id: case_id.clone(),
            computed_at: now,
            signals,
        };
        let previous = self.store.replace_for_case(set.clone())?;

        let known: BTreeSet<_> = previous
            .iter()
            .flat_map(|set| set.signals.iter().map(|signal| signal.signal_type))
            .collect();
        for signal in set
            .signals
            .iter()
            .filter(|signal| !known.contains(&signal.signal_type))
        {
            if let Err(err) = self
                .integration
                .publish_signal(&webhook_payload(signal, now))
            {
                warn!(
                    case = %case_id,
                    signal = signal.signal_type.as_str(),
                    error = %err,
                    "signal webhook failed"
                );
            }
        }

        Ok(set)
    }

    fn notify(&self, notification: Notification) -> Result<(), TaskError> {
        let mut recipients = Vec::with_capacity(notification.recipients.len());
        for user_id in &notification.recipients {
            match self.directory.resolve(user_id)? {
                Some(identity) => recipients.push(identity),
                None => warn!(
                    case = %notification.case_id,
                    user = %user_id,
                    "no identity on file, skipping recipient"
                ),
            }
        }

        if recipients.is_empty() {
            return Ok(());
        }

        self.notifier
            .send(&recipients, &notification.subject, &notification.body)?;
        Ok(())
    }
}

impl<S> TaskHandler for LifecycleTaskHandler<S>
where
    S: LifecycleStore + 'static,
{
    fn handle(&self, task: BackgroundTask) -> Result<(), TaskError> {
        match task {
            BackgroundTask::RecomputeSignals { case_id, as_of } => {
                self.recompute(&case_id, as_of).map(|_| ())
            }
            BackgroundTask::Notify(notification) => self.notify(notification),
            BackgroundTask::PushTimeline(event) => {
                self.integration.push_timeline(&event)?;
                Ok(())
            }
        }
    }
}
