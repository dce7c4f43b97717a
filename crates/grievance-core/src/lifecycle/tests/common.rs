use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::lifecycle::defensibility::DefensibilityPack;
use crate::lifecycle::domain::{
    Actor, ActorId, Case, CaseId, CaseStatus, MemberId, NewCase, OrganizationId, Priority, Role,
};
use crate::lifecycle::memory::MemoryStore;
use crate::lifecycle::policy::LifecyclePolicy;
use crate::lifecycle::repository::{
    CaseRepository, DirectoryError, HookError, Identity, IdentityDirectory, IntegrationHook,
    NotificationError, NotificationSender, PackRepository, RepositoryError, SignalRepository,
    SignalSet, TimelineRepository, TransitionCommit,
};
use crate::lifecycle::service::CaseService;
use crate::lifecycle::signals::{Signal, SignalWebhookPayload};
use crate::lifecycle::timeline::{EventId, EventKind, EventType, TimelineEvent, VisibilityScope};

pub(super) const ORGANIZATION: &str = "org-steelworkers-local-12";
pub(super) const MEMBER: &str = "member-ana";

/// Timestamp in March 2026. The 2nd is a Monday.
pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn policy() -> Arc<LifecyclePolicy> {
    Arc::new(LifecyclePolicy::standard())
}

pub(super) fn member() -> Actor {
    Actor::new(MEMBER, Role::Member)
}

pub(super) fn steward() -> Actor {
    Actor::new("steward-lee", Role::Steward)
}

pub(super) fn officer() -> Actor {
    Actor::new("officer-okafor", Role::Officer)
}

pub(super) fn new_case(priority: Priority) -> NewCase {
    NewCase {
        title: "Unpaid overtime for night shift".to_string(),
        priority,
        organization_id: OrganizationId(ORGANIZATION.to_string()),
        member_id: MemberId(MEMBER.to_string()),
        assigned_to: Some(ActorId("steward-lee".to_string())),
        description: Some("Overtime for February was not paid out.".to_string()),
    }
}

/// Case snapshot for detector tests, with every timestamp set to `since`.
pub(super) fn case_in(status: CaseStatus, priority: Priority, since: DateTime<Utc>) -> Case {
    Case {
        id: CaseId("case-fixture".to_string()),
        title: "Shift scheduling dispute".to_string(),
        status,
        priority,
        created_at: since,
        status_changed_at: since,
        updated_at: since,
        assigned_to: None,
        organization_id: OrganizationId(ORGANIZATION.to_string()),
        member_id: MemberId(MEMBER.to_string()),
    }
}

pub(super) fn event(
    case: &Case,
    event_type: &str,
    author: &Actor,
    scope: VisibilityScope,
    occurred_at: DateTime<Utc>,
) -> TimelineEvent {
    TimelineEvent {
        id: EventId::generate(),
        case_id: case.id.clone(),
        kind: if event_type == EventType::STATUS_CHANGE {
            EventKind::Transition
        } else {
            EventKind::Update
        },
        event_type: EventType::new(event_type),
        occurred_at,
        message: format!("{event_type} by {}", author.id),
        author: author.id.clone(),
        author_role: author.role,
        scope,
        metadata: BTreeMap::new(),
    }
}

/// A staff reply visible to the member, which completes acknowledgment and first response.
pub(super) fn staff_reply(case: &Case, occurred_at: DateTime<Utc>) -> TimelineEvent {
    event(
        case,
        EventType::STAFF_RESPONSE,
        &steward(),
        VisibilityScope::Member,
        occurred_at,
    )
}

pub(super) fn status_change(
    case: &Case,
    from: CaseStatus,
    to: CaseStatus,
    author: &Actor,
    occurred_at: DateTime<Utc>,
) -> TimelineEvent {
    let mut change = event(
        case,
        EventType::STATUS_CHANGE,
        author,
        VisibilityScope::Member,
        occurred_at,
    );
    change
        .metadata
        .insert("from_status".to_string(), Value::from(from.as_str()));
    change
        .metadata
        .insert("to_status".to_string(), Value::from(to.as_str()));
    change
        .metadata
        .insert("actor_role".to_string(), Value::from(author.role.label()));
    change
        .metadata
        .insert("validation_passed".to_string(), Value::from(true));
    change
}

#[derive(Default)]
pub(super) struct StaticDirectory;

impl IdentityDirectory for StaticDirectory {
    fn resolve(&self, user_id: &str) -> Result<Option<Identity>, DirectoryError> {
        if user_id == "unknown-user" {
            return Ok(None);
        }
        Ok(Some(Identity {
            user_id: user_id.to_string(),
            display_name: user_id.replace('-', " "),
            email: format!("{user_id}@union.example.org"),
        }))
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String)>>,
    pub(super) fail: bool,
}

impl RecordingNotifier {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    /// Recipient emails and subject of each delivered notification.
    pub(super) fn sent(&self) -> Vec<(Vec<String>, String)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationSender for RecordingNotifier {
    fn send(
        &self,
        recipients: &[Identity],
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        if self.fail {
            return Err(NotificationError::Transport("smtp relay offline".to_string()));
        }
        self.sent.lock().expect("notifier mutex poisoned").push((
            recipients
                .iter()
                .map(|identity| identity.email.clone())
                .collect(),
            subject.to_string(),
        ));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingIntegration {
    pushed: Mutex<Vec<EventId>>,
    published: Mutex<Vec<SignalWebhookPayload>>,
}

impl RecordingIntegration {
    pub(super) fn pushed(&self) -> Vec<EventId> {
        self.pushed.lock().expect("integration mutex poisoned").clone()
    }

    pub(super) fn published(&self) -> Vec<SignalWebhookPayload> {
        self.published
            .lock()
            .expect("integration mutex poisoned")
            .clone()
    }
}

impl IntegrationHook for RecordingIntegration {
    fn push_timeline(&self, event: &TimelineEvent) -> Result<(), HookError> {
        self.pushed
            .lock()
            .expect("integration mutex poisoned")
            .push(event.id.clone());
        Ok(())
    }

    fn publish_signal(&self, payload: &SignalWebhookPayload) -> Result<(), HookError> {
        self.published
            .lock()
            .expect("integration mutex poisoned")
            .push(payload.clone());
        Ok(())
    }
}

pub(super) struct Harness<S> {
    pub(super) service: CaseService<S>,
    pub(super) store: Arc<S>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) integration: Arc<RecordingIntegration>,
}

pub(super) fn harness_with<S>(store: S, notifier: RecordingNotifier) -> Harness<S>
where
    S: crate::lifecycle::repository::LifecycleStore + 'static,
{
    let store = Arc::new(store);
    let notifier = Arc::new(notifier);
    let integration = Arc::new(RecordingIntegration::default());
    let service = CaseService::inline(
        Arc::clone(&store),
        policy(),
        Arc::new(StaticDirectory),
        notifier.clone(),
        integration.clone(),
    );
    Harness {
        service,
        store,
        notifier,
        integration,
    }
}

pub(super) fn harness() -> Harness<MemoryStore> {
    harness_with(MemoryStore::new(), RecordingNotifier::default())
}

/// Memory store with switchable failures on the write paths.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: MemoryStore,
    pub(super) fail_commits: bool,
    pub(super) fail_packs: bool,
    pub(super) stale_commits: bool,
}

impl CaseRepository for FlakyStore {
    fn insert(&self, case: Case) -> Result<Case, RepositoryError> {
        self.inner.insert(case)
    }

    fn fetch(&self, id: &CaseId) -> Result<Option<Case>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn list(&self) -> Result<Vec<Case>, RepositoryError> {
        self.inner.list()
    }

    fn record_activity(&self, id: &CaseId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.inner.record_activity(id, at)
    }

    fn commit_transition(&self, commit: TransitionCommit) -> Result<Case, RepositoryError> {
        if self.fail_commits {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        if self.stale_commits {
            return Err(RepositoryError::StaleStatus {
                expected: commit.expected_status,
                found: CaseStatus::Rejected,
            });
        }
        self.inner.commit_transition(commit)
    }
}

impl TimelineRepository for FlakyStore {
    fn append(&self, event: TimelineEvent) -> Result<TimelineEvent, RepositoryError> {
        self.inner.append(event)
    }

    fn events_for_case(&self, id: &CaseId) -> Result<Vec<TimelineEvent>, RepositoryError> {
        self.inner.events_for_case(id)
    }
}

impl SignalRepository for FlakyStore {
    fn replace_for_case(&self, set: SignalSet) -> Result<Option<SignalSet>, RepositoryError> {
        self.inner.replace_for_case(set)
    }

    fn current_for_case(&self, id: &CaseId) -> Result<Vec<Signal>, RepositoryError> {
        self.inner.current_for_case(id)
    }

    fn all_current(&self) -> Result<Vec<Signal>, RepositoryError> {
        self.inner.all_current()
    }

    fn history_for_case(&self, id: &CaseId) -> Result<Vec<SignalSet>, RepositoryError> {
        self.inner.history_for_case(id)
    }
}

impl PackRepository for FlakyStore {
    fn store(&self, pack: DefensibilityPack) -> Result<(), RepositoryError> {
        if self.fail_packs {
            return Err(RepositoryError::Unavailable("object storage offline".to_string()));
        }
        self.inner.store(pack)
    }

    fn packs_for_case(&self, id: &CaseId) -> Result<Vec<DefensibilityPack>, RepositoryError> {
        self.inner.packs_for_case(id)
    }

    fn latest_version(&self, id: &CaseId) -> Result<u32, RepositoryError> {
        self.inner.latest_version(id)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
