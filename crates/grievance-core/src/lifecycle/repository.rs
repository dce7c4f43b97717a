use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::defensibility::DefensibilityPack;
use super::domain::{Case, CaseId, CaseStatus};
use super::signals::{Signal, SignalWebhookPayload};
use super::timeline::TimelineEvent;

/// A validated status change together with the audit event that records it.
///
/// Both are persisted as one unit. The write fails with [`RepositoryError::StaleStatus`]
/// when the stored case no longer carries `expected_status`.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub case: Case,
    pub expected_status: CaseStatus,
    pub event: TimelineEvent,
}

/// Case storage. Implementations provide single-writer semantics per case.
pub trait CaseRepository: Send + Sync {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError>;
    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError>;
    fn list(&self) -> Result<Vec<Case>, RepositoryError>;
    /// Bumps `updated_at` after non-transition activity.
    fn record_activity(&self, id: &CaseId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
    fn commit_transition(&self, commit: TransitionCommit) -> Result<Case, RepositoryError>;
}

/// Append-only event log.
pub trait TimelineRepository: Send + Sync {
    fn append(&self, event: TimelineEvent) -> Result<TimelineEvent, RepositoryError>;
    /// Events for the case in the order they occurred.
    fn events_for_case(&self, id: &CaseId) -> Result<Vec<TimelineEvent>, RepositoryError>;
}

/// Signals computed for one case at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSet {
    pub case_id: CaseId,
    pub computed_at: DateTime<Utc>,
    pub signals: Vec<Signal>,
}

/// Current signals keyed by case. Each recomputation supersedes the previous set.
pub trait SignalRepository: Send + Sync {
    /// Stores the new set and returns the one it replaced.
    fn replace_for_case(&self, set: SignalSet) -> Result<Option<SignalSet>, RepositoryError>;
    fn current_for_case(&self, id: &CaseId) -> Result<Vec<Signal>, RepositoryError>;
    fn all_current(&self) -> Result<Vec<Signal>, RepositoryError>;
    /// Superseded sets, oldest first. Empty unless history retention is enabled.
    fn history_for_case(&self, id: &CaseId) -> Result<Vec<SignalSet>, RepositoryError>;
}

/// Versioned, write-once storage for defensibility packs.
pub trait PackRepository: Send + Sync {
    fn store(&self, pack: DefensibilityPack) -> Result<(), RepositoryError>;
    fn packs_for_case(&self, id: &CaseId) -> Result<Vec<DefensibilityPack>, RepositoryError>;
    fn latest_version(&self, id: &CaseId) -> Result<u32, RepositoryError>;
}

/// Store handle covering every persistence concern of the engine.
pub trait LifecycleStore:
    CaseRepository + TimelineRepository + SignalRepository + PackRepository
{
}

impl<T> LifecycleStore for T where
    T: CaseRepository + TimelineRepository + SignalRepository + PackRepository
{
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("case status changed concurrently (expected {expected}, found {found})")]
    StaleStatus {
        expected: CaseStatus,
        found: CaseStatus,
    },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Contact details resolved from the identity directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
}

/// Identity lookup owned by the surrounding platform.
pub trait IdentityDirectory: Send + Sync {
    fn resolve(&self, user_id: &str) -> Result<Option<Identity>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification transport. Delivery is fire-and-forget.
pub trait NotificationSender: Send + Sync {
    fn send(
        &self,
        recipients: &[Identity],
        subject: &str,
        body: &str,
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Hooks for external systems mirroring the case timeline and its signals.
pub trait IntegrationHook: Send + Sync {
    fn push_timeline(&self, event: &TimelineEvent) -> Result<(), HookError>;
    fn publish_signal(&self, payload: &SignalWebhookPayload) -> Result<(), HookError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("integration endpoint unavailable: {0}")]
    Transport(String),
}

/// Hook used when no external integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIntegration;

impl IntegrationHook for NoopIntegration {
    fn push_timeline(&self, _event: &TimelineEvent) -> Result<(), HookError> {
        Ok(())
    }

    fn publish_signal(&self, _payload: &SignalWebhookPayload) -> Result<(), HookError> {
        Ok(())
    }
}
