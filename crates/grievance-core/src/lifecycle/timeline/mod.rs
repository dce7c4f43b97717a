//! Append-only case timeline with visibility-scoped read projections.

mod event;
mod scope;
mod service;

pub use event::{EventId, EventKind, EventMetadata, EventType, NewTimelineEvent, TimelineEvent};
pub use scope::{can_view, resolve_scope, visible_scopes, VisibilityScope};
pub use service::{TimelineError, TimelineService};
