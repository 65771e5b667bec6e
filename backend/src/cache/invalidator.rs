//! Post-commit cache eviction

use super::{keys, Cache};
use crate::database::EntityKind;

/// Evicts every cache entry derivable from a mutated document
///
/// For a change to a document of `kind`:
/// - its own detail entry (when the id is known)
/// - every list page of `kind`
/// - the dashboard summary
/// - the calendar feed, for kinds shown on the production calendar
///
/// Failures are logged and never returned: the write they follow has
/// already committed.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Cache,
}

impl CacheInvalidator {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Keys and patterns evicted for a change, in eviction order
    pub fn targets(kind: EntityKind, id: Option<&str>) -> Vec<String> {
        let mut targets = Vec::with_capacity(4);

        if let Some(id) = id {
            targets.push(keys::document(kind, id));
        }
        targets.push(keys::list_pattern(kind));
        targets.push(keys::dashboard().to_string());
        if kind.on_calendar() {
            targets.push(keys::calendar().to_string());
        }

        targets
    }

    pub async fn invalidate(&self, kind: EntityKind, id: Option<&str>) {
        if !self.cache.is_enabled() {
            return;
        }

        for target in Self::targets(kind, id) {
            let outcome = if target.ends_with('*') {
                self.cache.delete_pattern(&target).await.map(|_| ())
            } else {
                self.cache.delete(&target).await
            };

            if let Err(e) = outcome {
                tracing::warn!("Cache eviction of {} failed: {}", target, e);
            }
        }

        tracing::debug!("Invalidated cache for {} {:?}", kind, id);
    }
}
