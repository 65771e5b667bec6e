//! Read-only report commands: dashboard, calendar feed, exports, activity

use crate::app::AppState;
use crate::database::{ActivityEntry, EntityKind};
use crate::error::Result;
use crate::services::export::ExportReport;
use crate::services::DashboardSummary;
use serde::Deserialize;

const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
const MAX_ACTIVITY_LIMIT: u32 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArgs {
    #[serde(default)]
    pub kind: Option<EntityKind>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityArgs {
    #[serde(default)]
    pub limit: Option<u32>,
}

pub async fn get_dashboard_summary(state: &AppState) -> Result<DashboardSummary> {
    state.dashboard.summary().await
}

/// The production calendar as iCalendar text
pub async fn get_calendar_feed(state: &AppState) -> Result<String> {
    state.calendar.feed().await
}

/// Export one kind, or every kind when none is named
pub async fn export_documents(state: &AppState, args: ExportArgs) -> Result<ExportReport> {
    let dir = state.config.export_dir();

    match args.kind {
        Some(kind) => {
            let (path, rows) = state.export.export_kind(kind, &dir).await?;
            Ok(ExportReport {
                directory: dir,
                files: vec![path],
                rows,
            })
        }
        None => state.export.export_all(&dir).await,
    }
}

pub async fn list_activity(state: &AppState, args: ActivityArgs) -> Result<Vec<ActivityEntry>> {
    let limit = args
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    state.repo.list_activity(limit).await
}
