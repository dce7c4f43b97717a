use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::defensibility::{DefensibilityPack, PackError, PackGenerator, PackOptions};
use super::dispatch::{
    BackgroundTask, InlineDispatcher, LifecycleTaskHandler, Notification, TaskDispatcher,
};
use super::domain::{Actor, Case, CaseId, CaseStatus, NewCase};
use super::policy::LifecyclePolicy;
use super::repository::{
    IdentityDirectory, IntegrationHook, LifecycleStore, NotificationSender, RepositoryError,
    TransitionCommit,
};
use super::signals::{dashboard, Signal, SignalDashboard, SignalDetector};
use super::timeline::{
    EventId, EventType, NewTimelineEvent, TimelineError, TimelineEvent, TimelineService,
    VisibilityScope,
};
use super::transitions::{
    TransitionDecision, TransitionError, TransitionRequest, TransitionValidator,
};

/// Why a status update did not go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFailure {
    NotFound,
    Rejected,
    Conflict,
}

/// Structured result of [`CaseService::update_status`]. Rule rejections and missing cases
/// are reported here; only infrastructure failures surface as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdateOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<UpdateFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case: Option<Case>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<TransitionDecision>,
    /// Export version written for a terminal transition, when generation succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_version: Option<u32>,
}

impl StatusUpdateOutcome {
    fn failed(failure: UpdateFailure, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            failure: Some(failure),
            case: None,
            decision: None,
            export_version: None,
        }
    }
}

/// Error raised by the case service for infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum CaseServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Pack(#[from] PackError),
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
}

/// Service composing the validator, timeline, signal detector and pack generator over a
/// single store.
pub struct CaseService<S> {
    store: Arc<S>,
    validator: TransitionValidator,
    detector: SignalDetector,
    timeline: TimelineService<S>,
    dispatcher: Arc<dyn TaskDispatcher>,
    packs: PackGenerator,
}

impl<S> CaseService<S>
where
    S: LifecycleStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        policy: Arc<LifecyclePolicy>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        let detector = SignalDetector::from_policy(&policy);
        let timeline = TimelineService::new(Arc::clone(&store), Arc::clone(&dispatcher));
        Self {
            store,
            validator: TransitionValidator::new(policy),
            detector,
            timeline,
            dispatcher,
            packs: PackGenerator::new(),
        }
    }

    /// Wires a [`LifecycleTaskHandler`] behind an [`InlineDispatcher`], so follow-up work
    /// completes before each call returns.
    pub fn inline(
        store: Arc<S>,
        policy: Arc<LifecyclePolicy>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSender>,
        integration: Arc<dyn IntegrationHook>,
    ) -> Self {
        let handler = LifecycleTaskHandler::new(
            Arc::clone(&store),
            SignalDetector::from_policy(&policy),
            directory,
            notifier,
            integration,
        );
        let dispatcher: Arc<dyn TaskDispatcher> =
            Arc::new(InlineDispatcher::new(Arc::new(handler)));
        Self::new(store, policy, dispatcher)
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        self.validator.policy()
    }

    pub fn validator(&self) -> &TransitionValidator {
        &self.validator
    }

    pub fn timeline(&self) -> &TimelineService<S> {
        &self.timeline
    }

    pub fn case(&self, case_id: &CaseId) -> Result<Option<Case>, CaseServiceError> {
        Ok(self.store.fetch(case_id)?)
    }

    pub fn open_case(&self, new_case: NewCase, actor: &Actor) -> Result<Case, CaseServiceError> {
        self.open_case_at(new_case, actor, Utc::now())
    }

    /// Stores a `submitted` case and records the member-visible intake event.
    pub fn open_case_at(
        &self,
        new_case: NewCase,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Case, CaseServiceError> {
        let summary = new_case
            .description
            .clone()
            .unwrap_or_else(|| new_case.title.clone());
        let case = self.store.insert(new_case.into_case(CaseId::generate(), now))?;

        let event = NewTimelineEvent::new(
            case.id.clone(),
            EventType::CASE_SUBMITTED,
            summary,
            actor.clone(),
        )
        .with_scope(VisibilityScope::Member)
        .with_metadata("priority", case.priority.label())
        .at(now);
        let event = self.store.append(event.into_event(now))?;

        info!(case = %case.id, priority = case.priority.label(), "case opened");
        self.timeline.notify_appended(event, now);
        Ok(case)
    }

    /// Pure validation of an explicit request. Never touches the store.
    pub fn validate_transition(
        &self,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionDecision, CaseServiceError> {
        Ok(self.validator.validate(request, now)?)
    }

    /// Validates a transition for a stored case without applying it. `None` when the case
    /// does not exist.
    pub fn preview_transition(
        &self,
        case_id: &CaseId,
        target: CaseStatus,
        actor: &Actor,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<TransitionDecision>, CaseServiceError> {
        let Some(case) = self.store.fetch(case_id)? else {
            return Ok(None);
        };
        let request = self.request_for(&case, target, actor, notes, now)?;
        Ok(Some(self.validator.validate(&request, now)?))
    }

    pub fn update_status(
        &self,
        case_id: &CaseId,
        target: CaseStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<StatusUpdateOutcome, CaseServiceError> {
        self.update_status_at(case_id, target, actor, notes, Utc::now())
    }

    /// Validates and commits a status change together with its audit event, then runs the
    /// best-effort follow-ups: signal recomputation, terminal export and notifications.
    pub fn update_status_at(
        &self,
        case_id: &CaseId,
        target: CaseStatus,
        actor: &Actor,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<StatusUpdateOutcome, CaseServiceError> {
        let Some(case) = self.store.fetch(case_id)? else {
            return Ok(StatusUpdateOutcome::failed(
                UpdateFailure::NotFound,
                format!("case {case_id} not found"),
            ));
        };

        let request = self.request_for(&case, target, actor, notes, now)?;
        let decision = self.validator.validate(&request, now)?;
        if !decision.allowed {
            let reason = decision
                .reason
                .clone()
                .unwrap_or_else(|| "transition rejected".to_string());
            info!(
                case = %case_id,
                from = %case.status,
                to = %target,
                %reason,
                "transition rejected"
            );
            return Ok(StatusUpdateOutcome {
                decision: Some(decision),
                ..StatusUpdateOutcome::failed(UpdateFailure::Rejected, reason)
            });
        }

        let event = status_change_event(&case, target, actor, notes, &decision, now);
        let updated = Case {
            status: target,
            status_changed_at: now,
            updated_at: now,
            ..case.clone()
        };

        let committed = match self.store.commit_transition(TransitionCommit {
            case: updated,
            expected_status: case.status,
            event: event.clone(),
        }) {
            Ok(committed) => committed,
            Err(err @ RepositoryError::StaleStatus { .. }) => {
                warn!(case = %case_id, error = %err, "transition lost a concurrent update");
                return Ok(StatusUpdateOutcome {
                    decision: Some(decision),
                    ..StatusUpdateOutcome::failed(UpdateFailure::Conflict, err.to_string())
                });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            case = %case_id,
            from = %case.status,
            to = %target,
            actor = %actor.id,
            warnings = decision.warnings.len(),
            "transition committed"
        );
        self.timeline.notify_appended(event, now);

        let export_version = if target.triggers_export() {
            let options = PackOptions::new(
                format!("automatic export on {}", target.as_str()),
                actor.id.clone(),
            );
            match self.generate_pack_at(case_id, &options, now) {
                Ok(pack) => Some(pack.export_version),
                Err(err) => {
                    warn!(case = %case_id, error = %err, "defensibility pack generation failed");
                    None
                }
            }
        } else {
            None
        };

        self.notify_participants(&committed, case.status, actor);

        Ok(StatusUpdateOutcome {
            success: true,
            error: None,
            failure: None,
            case: Some(committed),
            decision: Some(decision),
            export_version,
        })
    }

    pub fn add_event(&self, payload: NewTimelineEvent) -> Result<EventId, CaseServiceError> {
        self.add_event_at(payload, Utc::now())
    }

    pub fn add_event_at(
        &self,
        payload: NewTimelineEvent,
        now: DateTime<Utc>,
    ) -> Result<EventId, CaseServiceError> {
        self.timeline.add_event_at(payload, now).map_err(|err| match err {
            TimelineError::Repository(err) => CaseServiceError::Repository(err),
            TimelineError::CaseNotFound(id) | TimelineError::Forbidden(id) => {
                CaseServiceError::CaseNotFound(id)
            }
        })
    }

    /// Runs the detector against the stored case without persisting the result.
    pub fn detect_signals(
        &self,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Signal>, CaseServiceError> {
        let case = self
            .store
            .fetch(case_id)?
            .ok_or_else(|| CaseServiceError::CaseNotFound(case_id.clone()))?;
        let timeline = self.store.events_for_case(case_id)?;
        Ok(self.detector.detect(&case, &timeline, now))
    }

    pub fn current_signals(&self, case_id: &CaseId) -> Result<Vec<Signal>, CaseServiceError> {
        Ok(self.store.current_for_case(case_id)?)
    }

    pub fn signal_dashboard(&self) -> Result<SignalDashboard, CaseServiceError> {
        Ok(dashboard(&self.store.all_current()?))
    }

    pub fn generate_pack(
        &self,
        case_id: &CaseId,
        options: &PackOptions,
    ) -> Result<DefensibilityPack, CaseServiceError> {
        self.generate_pack_at(case_id, options, Utc::now())
    }

    /// Builds the next export version from the stored timeline and persists it.
    pub fn generate_pack_at(
        &self,
        case_id: &CaseId,
        options: &PackOptions,
        now: DateTime<Utc>,
    ) -> Result<DefensibilityPack, CaseServiceError> {
        let case = self
            .store
            .fetch(case_id)?
            .ok_or_else(|| CaseServiceError::CaseNotFound(case_id.clone()))?;
        let timeline = self.store.events_for_case(case_id)?;
        let version = self.store.latest_version(case_id)? + 1;

        let pack = self
            .packs
            .generate_from_timeline(&case, &timeline, version, options, now)?;
        self.store.store(pack.clone())?;

        info!(
            case = %case_id,
            version = pack.export_version,
            combined = %pack.hashes.combined,
            "defensibility pack generated"
        );
        Ok(pack)
    }

    pub fn packs(&self, case_id: &CaseId) -> Result<Vec<DefensibilityPack>, CaseServiceError> {
        Ok(self.store.packs_for_case(case_id)?)
    }

    /// Builds the validator input. Signals are detected at `now` rather than read from the
    /// last stored set, which may predate the latest write or miss a breach since then.
    fn request_for(
        &self,
        case: &Case,
        target: CaseStatus,
        actor: &Actor,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TransitionRequest, CaseServiceError> {
        let timeline = self.store.events_for_case(&case.id)?;
        let has_unresolved_critical_signals = self
            .detector
            .detect(case, &timeline, now)
            .iter()
            .any(Signal::is_blocking);
        let has_adequate_documentation = timeline
            .iter()
            .any(|event| event.event_type.is(EventType::DOCUMENT_ADDED));

        Ok(TransitionRequest {
            current: case.status,
            target,
            actor: actor.clone(),
            priority: case.priority,
            status_entered_at: case.status_changed_at,
            has_unresolved_critical_signals,
            has_adequate_documentation,
            notes: notes.map(str::to_string),
        })
    }

    fn notify_participants(&self, case: &Case, previous: CaseStatus, actor: &Actor) {
        let mut recipients = vec![case.member_id.0.clone()];
        if let Some(assignee) = &case.assigned_to {
            if assignee != &actor.id {
                recipients.push(assignee.0.clone());
            }
        }

        let notification = Notification {
            case_id: case.id.clone(),
            recipients,
            subject: format!("Case {} is now {}", case.id, case.status.label()),
            body: format!(
                "\"{}\" moved from {} to {}.",
                case.title,
                previous.label(),
                case.status.label()
            ),
        };

        if let Err(err) = self.dispatcher.dispatch(BackgroundTask::Notify(notification)) {
            warn!(case = %case.id, error = %err, "failed to dispatch status notification");
        }
    }
}

fn status_change_event(
    case: &Case,
    target: CaseStatus,
    actor: &Actor,
    notes: Option<&str>,
    decision: &TransitionDecision,
    now: DateTime<Utc>,
) -> TimelineEvent {
    let mut message = format!(
        "Status changed from {} to {}",
        case.status.label(),
        target.label()
    );
    if let Some(notes) = notes.map(str::trim).filter(|notes| !notes.is_empty()) {
        message = format!("{message}: {notes}");
    }

    let mut event = NewTimelineEvent::new(
        case.id.clone(),
        EventType::STATUS_CHANGE,
        message,
        actor.clone(),
    )
    .with_metadata("from_status", case.status.as_str())
    .with_metadata("to_status", target.as_str())
    .with_metadata("actor_role", actor.role.label())
    .with_metadata("validation_passed", decision.allowed)
    .with_metadata("sla_compliant", decision.metadata.sla_compliant)
    .at(now);
    if !decision.warnings.is_empty() {
        event = event.with_metadata("warnings", Value::from(decision.warnings.clone()));
    }
    if let Some(notes) = notes {
        event = event.with_metadata("notes", notes);
    }

    event.into_event(now)
}
