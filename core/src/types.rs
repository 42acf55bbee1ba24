//! Shared primitive types used across the scoring engine.

/// A stable, normalized actor-group identifier (trimmed, lowercase).
pub type GroupId = String;

/// Identifier of a single negotiation transcript.
pub type NegotiationId = String;

/// The canonical scoring-run identifier.
pub type RunId = String;

/// A calendar year, as used by the by_year and as_of_year modes.
pub type Year = i32;

/// Normalize a raw group name to its stable identifier.
///
/// Upstream sources disagree on case and padding ("LockBit3 ", "lockbit3").
pub fn normalize_group_id(raw: &str) -> GroupId {
    raw.trim().to_lowercase()
}
