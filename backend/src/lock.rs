//! Optimistic lock guard
//!
//! Documents carry their last-modified timestamp as a version marker.
//! Clients echo the marker they loaded back as `updatedAt`; a write is only
//! allowed when it still matches the stored value.

use chrono::{DateTime, Duration, DurationRound, Utc};
use thiserror::Error;

/// The client edited a stale copy of the document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Document was modified by someone else (loaded version {}, current version {}). Reload and try again.",
    .client.to_rfc3339(),
    .current.to_rfc3339()
)]
pub struct VersionConflict {
    pub client: DateTime<Utc>,
    pub current: DateTime<Utc>,
}

/// Truncate a timestamp to millisecond precision
pub fn normalize(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::milliseconds(1)).unwrap_or(ts)
}

/// Check a client-supplied version against the stored one.
///
/// A missing client version always passes.
pub fn verify(
    client: Option<DateTime<Utc>>,
    current: DateTime<Utc>,
) -> std::result::Result<(), VersionConflict> {
    let Some(client) = client else {
        return Ok(());
    };

    let client = normalize(client);
    let current = normalize(current);

    if client == current {
        Ok(())
    } else {
        Err(VersionConflict { client, current })
    }
}

/// Version marker for the next write.
///
/// Always strictly later than `previous`, even when two writes land in the
/// same millisecond.
pub fn next_version(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = normalize(Utc::now());
    let floor = normalize(previous) + Duration::milliseconds(1);
    now.max(floor)
}
