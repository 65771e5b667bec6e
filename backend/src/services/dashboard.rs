//! Dashboard aggregates

use crate::cache::{keys, Cache};
use crate::config::DASHBOARD_CACHE_TTL_SECS;
use crate::database::repository::StatusTotal;
use crate::database::{EntityKind, Repository};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Totals of one document kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSummary {
    pub kind: EntityKind,
    pub count: i64,
    pub total_amount: i64,
    /// Document count per status, in status order; absent statuses omitted
    pub by_status: Vec<(String, i64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub kinds: Vec<KindSummary>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardSummary {
    pub fn kind(&self, kind: EntityKind) -> Option<&KindSummary> {
        self.kinds.iter().find(|k| k.kind == kind)
    }
}

#[derive(Clone)]
pub struct DashboardService {
    repo: Repository,
    cache: Cache,
}

impl DashboardService {
    pub fn new(repo: Repository, cache: Cache) -> Self {
        Self { repo, cache }
    }

    /// Counts and amounts of live documents per kind and status
    pub async fn summary(&self) -> Result<DashboardSummary> {
        if let Some(summary) = self.cache.get_json(keys::dashboard()).await {
            return Ok(summary);
        }

        let mut kinds = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let totals = self.repo.status_totals(kind).await?;
            kinds.push(summarize(kind, &totals));
        }

        let summary = DashboardSummary {
            kinds,
            generated_at: Utc::now(),
        };

        self.cache
            .set_json(
                keys::dashboard(),
                &summary,
                Duration::from_secs(DASHBOARD_CACHE_TTL_SECS),
            )
            .await;

        Ok(summary)
    }
}

fn summarize(kind: EntityKind, totals: &[StatusTotal]) -> KindSummary {
    let mut by_status: Vec<(String, i64)> = totals
        .iter()
        .map(|t| (t.status.as_str().to_string(), t.count))
        .collect();
    by_status.sort_by_key(|(status, _)| {
        crate::database::DocumentStatus::ALL
            .iter()
            .position(|s| s.as_str() == status)
    });

    KindSummary {
        kind,
        count: totals.iter().map(|t| t.count).sum(),
        total_amount: totals.iter().map(|t| t.total_amount).sum(),
        by_status,
    }
}
