use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::super::dispatch::{BackgroundTask, TaskDispatcher};
use super::super::domain::{Case, CaseId, MemberId, OrganizationId, Role};
use super::super::repository::{CaseRepository, RepositoryError, TimelineRepository};
use super::event::{EventId, NewTimelineEvent, TimelineEvent};
use super::scope::{staff_projection_scopes, visible_scopes, VisibilityScope};

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("case {0} is not visible to the requester")]
    Forbidden(CaseId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Writes timeline events and serves the member and staff projections.
pub struct TimelineService<S> {
    store: Arc<S>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl<S> Clone for TimelineService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<S> TimelineService<S>
where
    S: CaseRepository + TimelineRepository + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    pub fn add_event(&self, payload: NewTimelineEvent) -> Result<EventId, TimelineError> {
        self.add_event_at(payload, Utc::now())
    }

    /// Persists the event, then hands signal recomputation and the integration push to the
    /// dispatcher. Only the persistence step can fail the call.
    pub fn add_event_at(
        &self,
        payload: NewTimelineEvent,
        now: DateTime<Utc>,
    ) -> Result<EventId, TimelineError> {
        self.case(&payload.case_id)?;

        let event = self.store.append(payload.into_event(now))?;
        self.store.record_activity(&event.case_id, now)?;

        let id = event.id.clone();
        self.notify_appended(event, now);
        Ok(id)
    }

    /// Runs the post-write side effects for an event persisted elsewhere, such as the
    /// audit entry committed with a status transition.
    pub fn notify_appended(&self, event: TimelineEvent, now: DateTime<Utc>) {
        let case_id = event.case_id.clone();
        let tasks = [
            BackgroundTask::RecomputeSignals {
                case_id: case_id.clone(),
                as_of: now,
            },
            BackgroundTask::PushTimeline(event),
        ];

        for task in tasks {
            let label = task.label();
            if let Err(err) = self.dispatcher.dispatch(task) {
                warn!(
                    case = %case_id,
                    task = label,
                    error = %err,
                    "failed to dispatch timeline follow-up"
                );
            }
        }
    }

    /// Member-visible events, newest first. Only the owning member may read them.
    pub fn member_timeline(
        &self,
        case_id: &CaseId,
        member_id: &MemberId,
    ) -> Result<Vec<TimelineEvent>, TimelineError> {
        let case = self.case(case_id)?;
        if &case.member_id != member_id {
            return Err(TimelineError::Forbidden(case_id.clone()));
        }
        self.projection(case_id, &[VisibilityScope::Member])
    }

    /// Member, staff and admin events, newest first, for staff of the owning organization.
    pub fn staff_timeline(
        &self,
        case_id: &CaseId,
        organization_id: &OrganizationId,
    ) -> Result<Vec<TimelineEvent>, TimelineError> {
        let case = self.case(case_id)?;
        if &case.organization_id != organization_id {
            return Err(TimelineError::Forbidden(case_id.clone()));
        }
        self.projection(case_id, staff_projection_scopes())
    }

    /// Events the role may see, newest first. Callers are responsible for access gating.
    pub fn timeline_for_role(
        &self,
        case_id: &CaseId,
        role: Role,
    ) -> Result<Vec<TimelineEvent>, TimelineError> {
        self.case(case_id)?;
        self.projection(case_id, visible_scopes(role))
    }

    /// Every event in chronological order, system events included.
    pub fn full_timeline(&self, case_id: &CaseId) -> Result<Vec<TimelineEvent>, TimelineError> {
        self.case(case_id)?;
        Ok(self.store.events_for_case(case_id)?)
    }

    fn case(&self, case_id: &CaseId) -> Result<Case, TimelineError> {
        self.store
            .fetch(case_id)?
            .ok_or_else(|| TimelineError::CaseNotFound(case_id.clone()))
    }

    fn projection(
        &self,
        case_id: &CaseId,
        scopes: &[VisibilityScope],
    ) -> Result<Vec<TimelineEvent>, TimelineError> {
        let mut events: Vec<TimelineEvent> = self
            .store
            .events_for_case(case_id)?
            .into_iter()
            .filter(|event| scopes.contains(&event.scope))
            .collect();
        events.reverse();
        Ok(events)
    }
}
