use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::defensibility::{
    DefensibilityPack, ExportFormat, PackHashes, PackOptions, VerificationStatus,
};
use super::domain::{Actor, ActorId, CaseId, CaseStatus, MemberId, NewCase, OrganizationId};
use super::repository::LifecycleStore;
use super::service::{CaseService, CaseServiceError, UpdateFailure};
use super::timeline::{
    EventMetadata, EventType, NewTimelineEvent, TimelineError, TimelineEvent, VisibilityScope,
};

/// Router builder exposing the case lifecycle endpoints.
pub fn lifecycle_router<S>(service: Arc<CaseService<S>>) -> Router
where
    S: LifecycleStore + 'static,
{
    Router::new()
        .route("/api/v1/cases", post(open_case_handler::<S>))
        .route("/api/v1/cases/:case_id", get(case_handler::<S>))
        .route(
            "/api/v1/cases/:case_id/transitions/validate",
            post(validate_handler::<S>),
        )
        .route("/api/v1/cases/:case_id/status", post(update_status_handler::<S>))
        .route("/api/v1/cases/:case_id/events", post(add_event_handler::<S>))
        .route(
            "/api/v1/cases/:case_id/timeline/member",
            get(member_timeline_handler::<S>),
        )
        .route(
            "/api/v1/cases/:case_id/timeline/staff",
            get(staff_timeline_handler::<S>),
        )
        .route("/api/v1/cases/:case_id/signals", get(signals_handler::<S>))
        .route(
            "/api/v1/cases/:case_id/packs",
            get(list_packs_handler::<S>).post(generate_pack_handler::<S>),
        )
        .route("/api/v1/signals/dashboard", get(dashboard_handler::<S>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenCaseRequest {
    #[serde(flatten)]
    pub(crate) case: NewCase,
    pub(crate) actor: Actor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionPayload {
    pub(crate) target: String,
    pub(crate) actor: Actor,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EventPayload {
    pub(crate) event_type: String,
    pub(crate) message: String,
    pub(crate) author: Actor,
    #[serde(default)]
    pub(crate) scope: Option<VisibilityScope>,
    #[serde(default)]
    pub(crate) internal: bool,
    #[serde(default)]
    pub(crate) metadata: EventMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MemberQuery {
    pub(crate) member_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StaffQuery {
    pub(crate) organization_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PackRequest {
    pub(crate) purpose: String,
    pub(crate) generated_by: String,
    #[serde(default)]
    pub(crate) format: ExportFormat,
    #[serde(default)]
    pub(crate) include_sensitive_data: bool,
}

/// Pack listing entry. Bodies are omitted to keep listings small.
#[derive(Debug, Serialize)]
pub(crate) struct PackView {
    pub(crate) id: String,
    pub(crate) export_version: u32,
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) generated_by: ActorId,
    pub(crate) purpose: String,
    pub(crate) format: ExportFormat,
    pub(crate) hashes: PackHashes,
    pub(crate) size_bytes: usize,
    pub(crate) verification: VerificationStatus,
}

impl From<&DefensibilityPack> for PackView {
    fn from(pack: &DefensibilityPack) -> Self {
        Self {
            id: pack.id.to_string(),
            export_version: pack.export_version,
            generated_at: pack.generated_at,
            generated_by: pack.generated_by.clone(),
            purpose: pack.purpose.clone(),
            format: pack.format,
            hashes: pack.hashes.clone(),
            size_bytes: pack.size_bytes,
            verification: pack.verification,
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
    });
    (status, axum::Json(payload)).into_response()
}

fn infrastructure_error(err: CaseServiceError) -> Response {
    match err {
        CaseServiceError::CaseNotFound(id) => {
            error_response(StatusCode::NOT_FOUND, format!("case {id} not found"))
        }
        CaseServiceError::Transition(err) => {
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        other => {
            error!(error = %other, "case lifecycle request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn parse_target(raw: &str) -> Result<CaseStatus, Response> {
    raw.parse::<CaseStatus>()
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, err.to_string()))
}

pub(crate) async fn open_case_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    axum::Json(request): axum::Json<OpenCaseRequest>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    match service.open_case(request.case, &request.actor) {
        Ok(case) => (StatusCode::CREATED, axum::Json(case)).into_response(),
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn case_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    let id = CaseId(case_id);
    match service.case(&id) {
        Ok(Some(case)) => (StatusCode::OK, axum::Json(case)).into_response(),
        Ok(None) => infrastructure_error(CaseServiceError::CaseNotFound(id)),
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn validate_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
    axum::Json(payload): axum::Json<TransitionPayload>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    let target = match parse_target(&payload.target) {
        Ok(target) => target,
        Err(response) => return response,
    };
    let id = CaseId(case_id);
    match service.preview_transition(
        &id,
        target,
        &payload.actor,
        payload.notes.as_deref(),
        Utc::now(),
    ) {
        Ok(Some(decision)) => (StatusCode::OK, axum::Json(decision)).into_response(),
        Ok(None) => infrastructure_error(CaseServiceError::CaseNotFound(id)),
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn update_status_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
    axum::Json(payload): axum::Json<TransitionPayload>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    let target = match parse_target(&payload.target) {
        Ok(target) => target,
        Err(response) => return response,
    };
    let id = CaseId(case_id);
    match service.update_status(&id, target, &payload.actor, payload.notes.as_deref()) {
        Ok(outcome) => {
            let status = match outcome.failure {
                None => StatusCode::OK,
                Some(UpdateFailure::NotFound) => StatusCode::NOT_FOUND,
                Some(UpdateFailure::Rejected) => StatusCode::UNPROCESSABLE_ENTITY,
                Some(UpdateFailure::Conflict) => StatusCode::CONFLICT,
            };
            (status, axum::Json(outcome)).into_response()
        }
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn add_event_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
    axum::Json(payload): axum::Json<EventPayload>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    let event = NewTimelineEvent {
        case_id: CaseId(case_id),
        event_type: EventType::new(payload.event_type),
        message: payload.message,
        author: payload.author,
        scope: payload.scope,
        internal: payload.internal,
        metadata: payload.metadata,
        occurred_at: None,
    };

    match service.add_event(event) {
        Ok(event_id) => {
            (StatusCode::CREATED, axum::Json(json!({ "event_id": event_id }))).into_response()
        }
        Err(err) => infrastructure_error(err),
    }
}

fn timeline_response(result: Result<Vec<TimelineEvent>, TimelineError>) -> Response {
    match result {
        Ok(events) => (StatusCode::OK, axum::Json(events)).into_response(),
        Err(TimelineError::CaseNotFound(id)) => {
            error_response(StatusCode::NOT_FOUND, format!("case {id} not found"))
        }
        Err(TimelineError::Forbidden(id)) => error_response(
            StatusCode::FORBIDDEN,
            format!("case {id} is not visible to the requester"),
        ),
        Err(TimelineError::Repository(err)) => {
            error!(error = %err, "timeline read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub(crate) async fn member_timeline_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
    Query(query): Query<MemberQuery>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    timeline_response(
        service
            .timeline()
            .member_timeline(&CaseId(case_id), &MemberId(query.member_id)),
    )
}

pub(crate) async fn staff_timeline_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
    Query(query): Query<StaffQuery>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    timeline_response(
        service
            .timeline()
            .staff_timeline(&CaseId(case_id), &OrganizationId(query.organization_id)),
    )
}

pub(crate) async fn signals_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    match service.current_signals(&CaseId(case_id)) {
        Ok(signals) => (StatusCode::OK, axum::Json(signals)).into_response(),
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn dashboard_handler<S>(State(service): State<Arc<CaseService<S>>>) -> Response
where
    S: LifecycleStore + 'static,
{
    match service.signal_dashboard() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn generate_pack_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
    axum::Json(request): axum::Json<PackRequest>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    let options = PackOptions {
        purpose: request.purpose,
        format: request.format,
        include_sensitive_data: request.include_sensitive_data,
        generated_by: ActorId(request.generated_by),
    };
    match service.generate_pack(&CaseId(case_id), &options) {
        Ok(pack) => (StatusCode::CREATED, axum::Json(pack)).into_response(),
        Err(err) => infrastructure_error(err),
    }
}

pub(crate) async fn list_packs_handler<S>(
    State(service): State<Arc<CaseService<S>>>,
    Path(case_id): Path<String>,
) -> Response
where
    S: LifecycleStore + 'static,
{
    match service.packs(&CaseId(case_id)) {
        Ok(packs) => {
            let views: Vec<PackView> = packs.iter().map(PackView::from).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => infrastructure_error(err),
    }
}
