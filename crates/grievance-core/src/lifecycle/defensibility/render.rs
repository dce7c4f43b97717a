use serde::Serialize;

use super::{PackContents, PackError};

#[derive(Debug, Serialize)]
struct TimelineRow<'a> {
    occurred_at: String,
    event_id: &'a str,
    event_type: &'a str,
    scope: &'static str,
    author: &'a str,
    author_role: &'static str,
    message: &'a str,
    metadata: String,
}

pub(crate) fn render_json(contents: &PackContents) -> Result<String, PackError> {
    serde_json::to_string_pretty(contents).map_err(PackError::Serialization)
}

/// One CSV row per timeline event. Metadata is embedded as a JSON cell.
pub(crate) fn render_csv(contents: &PackContents) -> Result<String, PackError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for event in &contents.timeline {
        let metadata = serde_json::to_string(&event.metadata).map_err(PackError::Serialization)?;
        writer.serialize(TimelineRow {
            occurred_at: event.occurred_at.to_rfc3339(),
            event_id: &event.id.0,
            event_type: event.event_type.as_str(),
            scope: event.scope.label(),
            author: &event.author.0,
            author_role: event.author_role.label(),
            message: &event.message,
            metadata,
        })?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| PackError::Render(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| PackError::Render(err.to_string()))
}
