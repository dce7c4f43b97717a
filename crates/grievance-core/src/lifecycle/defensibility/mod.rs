//! Tamper-evident case exports.
//!
//! A pack bundles the ordered timeline, the derived audit trail and the transition list,
//! and seals each slice with a SHA-256 hash plus a combined hash over the three. Packs are
//! immutable; every export is stored as a new version.

mod audit;
mod hashing;
mod render;

pub use audit::{
    derive_audit_trail, derive_transitions, is_sensitive_key, sanitize_metadata, AuditEntry,
    TransitionRecord,
};
pub use hashing::{
    canonical_hash, combined_hash, hash_contents, sha256_hex, verify_pack, PackHashes,
    PackVerification,
};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{ActorId, Case, CaseId, CaseStatus, MemberId, OrganizationId, Priority};
use super::timeline::TimelineEvent;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackId(pub String);

impl PackId {
    pub fn generate() -> Self {
        Self(format!("pack-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackOptions {
    pub purpose: String,
    #[serde(default)]
    pub format: ExportFormat,
    #[serde(default)]
    pub include_sensitive_data: bool,
    pub generated_by: ActorId,
}

impl PackOptions {
    pub fn new(purpose: impl Into<String>, generated_by: ActorId) -> Self {
        Self {
            purpose: purpose.into(),
            format: ExportFormat::Json,
            include_sensitive_data: false,
            generated_by,
        }
    }
}

/// Header describing the case at export time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: CaseId,
    pub title: String,
    pub status: CaseStatus,
    pub priority: Priority,
    pub organization_id: OrganizationId,
    pub member_id: MemberId,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    pub event_count: usize,
    pub transition_count: usize,
}

/// The hashed body of a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackContents {
    pub summary: CaseSummary,
    pub timeline: Vec<TimelineEvent>,
    pub audit: Vec<AuditEntry>,
    pub transitions: Vec<TransitionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefensibilityPack {
    pub id: PackId,
    pub case_id: CaseId,
    pub export_version: u32,
    pub generated_at: DateTime<Utc>,
    pub generated_by: ActorId,
    pub purpose: String,
    pub format: ExportFormat,
    pub hashes: PackHashes,
    pub size_bytes: usize,
    pub verification: VerificationStatus,
    pub contents: PackContents,
    /// Contents rendered in `format`.
    pub body: String,
}

impl DefensibilityPack {
    pub fn verify(&self) -> Result<PackVerification, PackError> {
        verify_pack(&self.hashes, &self.contents)
    }

    /// Checks the rendered body against the recorded hashes rather than the in-memory
    /// contents.
    pub fn verify_body(&self) -> Result<bool, PackError> {
        verify_rendered(self.format, &self.body, &self.hashes, &self.contents)
    }
}

/// JSON bodies are parsed back and re-hashed. A CSV body only carries the timeline, so it
/// must equal the rendering of contents that still match their hashes.
fn verify_rendered(
    format: ExportFormat,
    body: &str,
    hashes: &PackHashes,
    contents: &PackContents,
) -> Result<bool, PackError> {
    match format {
        ExportFormat::Json => match serde_json::from_str::<PackContents>(body) {
            Ok(parsed) => Ok(verify_pack(hashes, &parsed)?.is_verified()),
            Err(_) => Ok(false),
        },
        ExportFormat::Csv => Ok(verify_pack(hashes, contents)?.is_verified()
            && render::render_csv(contents)? == body),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("failed to serialize pack contents: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to render pack: {0}")]
    Render(String),
}

/// Stateless pack builder. Identical inputs always produce identical hashes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackGenerator;

impl PackGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Derives the audit trail and transitions from the timeline, then builds the pack.
    pub fn generate_from_timeline(
        &self,
        case: &Case,
        timeline: &[TimelineEvent],
        export_version: u32,
        options: &PackOptions,
        now: DateTime<Utc>,
    ) -> Result<DefensibilityPack, PackError> {
        let mut ordered = timeline.to_vec();
        ordered.sort_by_key(|event| event.occurred_at);
        let audit = derive_audit_trail(&ordered, options.include_sensitive_data);
        let transitions = derive_transitions(&ordered);
        self.generate(
            case,
            &ordered,
            audit,
            transitions,
            export_version,
            options,
            now,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn generate(
        &self,
        case: &Case,
        timeline: &[TimelineEvent],
        audit: Vec<AuditEntry>,
        transitions: Vec<TransitionRecord>,
        export_version: u32,
        options: &PackOptions,
        now: DateTime<Utc>,
    ) -> Result<DefensibilityPack, PackError> {
        let mut timeline = timeline.to_vec();
        timeline.sort_by_key(|event| event.occurred_at);
        if !options.include_sensitive_data {
            for event in &mut timeline {
                event.metadata = sanitize_metadata(&event.metadata);
            }
        }

        let contents = PackContents {
            summary: CaseSummary {
                case_id: case.id.clone(),
                title: case.title.clone(),
                status: case.status,
                priority: case.priority,
                organization_id: case.organization_id.clone(),
                member_id: case.member_id.clone(),
                created_at: case.created_at,
                status_changed_at: case.status_changed_at,
                event_count: timeline.len(),
                transition_count: transitions.len(),
            },
            timeline,
            audit,
            transitions,
        };

        let hashes = hash_contents(&contents)?;
        let body = match options.format {
            ExportFormat::Json => render::render_json(&contents)?,
            ExportFormat::Csv => render::render_csv(&contents)?,
        };
        let verification = if verify_rendered(options.format, &body, &hashes, &contents)? {
            VerificationStatus::Verified
        } else {
            VerificationStatus::Failed
        };

        Ok(DefensibilityPack {
            id: PackId::generate(),
            case_id: case.id.clone(),
            export_version,
            generated_at: now,
            generated_by: options.generated_by.clone(),
            purpose: options.purpose.clone(),
            format: options.format,
            hashes,
            size_bytes: body.len(),
            verification,
            contents,
            body,
        })
    }
}
