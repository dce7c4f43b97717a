use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{PackContents, PackError};

/// SHA-256 digests over the canonical JSON of each pack slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackHashes {
    pub timeline: String,
    pub audit: String,
    pub transitions: String,
    pub combined: String,
}

/// Per-slice outcome of re-hashing a pack's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackVerification {
    pub timeline: bool,
    pub audit: bool,
    pub transitions: bool,
    pub combined: bool,
}

impl PackVerification {
    pub fn is_verified(&self) -> bool {
        self.timeline && self.audit && self.transitions && self.combined
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hashes a value's JSON encoding. Every map in the pack is ordered, so equal values
/// always encode to the same bytes.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, PackError> {
    let bytes = serde_json::to_vec(value).map_err(PackError::Serialization)?;
    Ok(sha256_hex(&bytes))
}

pub fn combined_hash(timeline: &str, audit: &str, transitions: &str) -> String {
    sha256_hex(format!("{timeline}:{audit}:{transitions}").as_bytes())
}

pub fn hash_contents(contents: &PackContents) -> Result<PackHashes, PackError> {
    let timeline = canonical_hash(&contents.timeline)?;
    let audit = canonical_hash(&contents.audit)?;
    let transitions = canonical_hash(&contents.transitions)?;
    let combined = combined_hash(&timeline, &audit, &transitions);

    Ok(PackHashes {
        timeline,
        audit,
        transitions,
        combined,
    })
}

/// Recomputes every slice hash and compares it with the recorded one.
pub fn verify_pack(
    hashes: &PackHashes,
    contents: &PackContents,
) -> Result<PackVerification, PackError> {
    let recomputed = hash_contents(contents)?;
    Ok(PackVerification {
        timeline: recomputed.timeline == hashes.timeline,
        audit: recomputed.audit == hashes.audit,
        transitions: recomputed.transitions == hashes.transitions,
        combined: combined_hash(&hashes.timeline, &hashes.audit, &hashes.transitions)
            == hashes.combined
            && recomputed.combined == hashes.combined,
    })
}
