//! Case lifecycle integrity engine.
//!
//! Every status change passes through the [`TransitionValidator`] and is committed together
//! with a scoped timeline event. Timeline writes trigger signal recomputation through a
//! [`TaskDispatcher`], and landing on `resolved` or `closed` produces a hashed
//! [`DefensibilityPack`].

pub mod deadlines;
pub mod defensibility;
pub mod dispatch;
pub mod domain;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod signals;
pub mod timeline;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use deadlines::{DeadlineCalculator, SlaDeadline};
pub use defensibility::{
    verify_pack, AuditEntry, DefensibilityPack, ExportFormat, PackContents, PackError,
    PackGenerator, PackHashes, PackOptions, PackVerification, TransitionRecord,
    VerificationStatus,
};
pub use dispatch::{
    BackgroundTask, DispatchError, InlineDispatcher, LifecycleTaskHandler, Notification,
    QueueDispatcher, TaskDispatcher, TaskHandler,
};
pub use domain::{
    Actor, ActorId, Case, CaseId, CaseStatus, MemberId, NewCase, OrganizationId, Priority, Role,
};
pub use memory::MemoryStore;
pub use policy::{EdgeRule, LifecyclePolicy, PolicyError, SignalSlaTargets, SlaTable};
pub use repository::{
    CaseRepository, DirectoryError, HookError, Identity, IdentityDirectory, IntegrationHook,
    LifecycleStore, NoopIntegration, NotificationError, NotificationSender, PackRepository,
    RepositoryError, SignalRepository, SignalSet, TimelineRepository, TransitionCommit,
};
pub use router::lifecycle_router;
pub use service::{CaseService, CaseServiceError, StatusUpdateOutcome, UpdateFailure};
pub use signals::{Signal, SignalDetector, SignalSeverity, SignalType};
pub use timeline::{
    EventId, EventType, NewTimelineEvent, TimelineError, TimelineEvent, TimelineService,
    VisibilityScope,
};
pub use transitions::{
    RejectionKind, TransitionDecision, TransitionError, TransitionRequest, TransitionValidator,
};
