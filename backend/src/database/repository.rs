//! Repository layer for database operations
//!
//! Queries shared by every document kind: version lookups, listing,
//! single-field status writes, soft deletes, plus the bookkeeping tables
//! (activity log, backups). Document trees themselves are read and written
//! through [`crate::database::Document`].

use super::models::*;
use crate::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MAX_SEARCH_LENGTH};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Status count and amount total of one kind
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotal {
    pub status: DocumentStatus,
    pub count: i64,
    pub total_amount: i64,
}

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Transaction that takes the write lock on `BEGIN`
    ///
    /// For transactions that read before they write: a deferred one could
    /// not upgrade once another writer committed in between.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Current version marker and status of a live document
    pub async fn version_of(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<(DateTime<Utc>, DocumentStatus)> {
        let sql = format!(
            "SELECT updated_at, status FROM {} WHERE id = ? AND deleted_at IS NULL",
            kind.table()
        );

        sqlx::query_as::<_, (DateTime<Utc>, DocumentStatus)>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))
    }

    /// One page of live parent records, most recently updated first
    pub async fn list_records<R>(
        &self,
        kind: EntityKind,
        search_columns: &[&str],
        filter: &ListFilter,
    ) -> Result<Page<R>>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let (page, per_page) = page_bounds(filter);

        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {}", kind.table()));
        push_filter(&mut count, search_columns, filter)?;
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT * FROM {}", kind.table()));
        push_filter(&mut select, search_columns, filter)?;
        select
            .push(" ORDER BY updated_at DESC, id LIMIT ")
            .push_bind(i64::from(per_page))
            .push(" OFFSET ")
            .push_bind(i64::from(page - 1) * i64::from(per_page));

        let items = select.build_query_as::<R>().fetch_all(&self.pool).await?;

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Write only the status column and a new version marker
    pub async fn update_status(
        &self,
        kind: EntityKind,
        id: &str,
        status: DocumentStatus,
        version: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            kind.table()
        );

        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(version)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(kind, id));
        }

        tracing::debug!("Set {} {} status to {}", kind, id, status);
        Ok(())
    }

    /// Soft delete a document
    pub async fn soft_delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let now = Utc::now();
        let sql = format!(
            "UPDATE {} SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            kind.table()
        );

        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(kind, id));
        }

        tracing::debug!("Soft deleted {}: {}", kind, id);
        Ok(())
    }

    /// Ids of soft-deleted documents of a kind
    pub async fn soft_deleted_ids(&self, kind: EntityKind) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT id FROM {} WHERE deleted_at IS NOT NULL ORDER BY deleted_at",
            kind.table()
        );

        let ids = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Count and amount per status of live documents
    pub async fn status_totals(&self, kind: EntityKind) -> Result<Vec<StatusTotal>> {
        let amount = kind
            .amount_column()
            .map(|column| format!("COALESCE(SUM({}), 0)", column))
            .unwrap_or_else(|| "0".to_string());

        let sql = format!(
            r#"
            SELECT status, COUNT(*) AS count, {} AS total_amount
            FROM {}
            WHERE deleted_at IS NULL
            GROUP BY status
            ORDER BY status
            "#,
            amount,
            kind.table()
        );

        let totals = sqlx::query_as::<_, StatusTotal>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(totals)
    }

    /// Append to the activity log
    pub async fn record_activity(
        &self,
        kind: EntityKind,
        entity_id: Option<&str>,
        action: &str,
    ) -> Result<ActivityEntry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let entry = sqlx::query_as::<_, ActivityEntry>(
            r#"
            INSERT INTO activity_log (id, entity_kind, entity_id, action, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(action)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Most recent activity entries, newest first
    pub async fn list_activity(&self, limit: u32) -> Result<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            r#"
            SELECT * FROM activity_log ORDER BY created_at DESC, rowid DESC LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Record a backup
    pub async fn record_backup(&self, path: &str, size: i64, manifest_hash: &str) -> Result<Backup> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let backup = sqlx::query_as::<_, Backup>(
            r#"
            INSERT INTO backups (id, timestamp, path, size, manifest_hash)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(now)
        .bind(path)
        .bind(size)
        .bind(manifest_hash)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Recorded backup: {}", id);
        Ok(backup)
    }

    /// List backups, newest first
    pub async fn list_backups(&self) -> Result<Vec<Backup>> {
        let backups = sqlx::query_as::<_, Backup>(
            r#"
            SELECT * FROM backups ORDER BY timestamp DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(backups)
    }

    pub async fn delete_backup_record(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM backups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Resolve the requested page and page size against the configured bounds
pub fn page_bounds(filter: &ListFilter) -> (u32, u32) {
    let page = filter.page.unwrap_or(1).max(1);
    let per_page = filter
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    (page, per_page)
}

fn push_filter(
    builder: &mut QueryBuilder<'_, Sqlite>,
    search_columns: &[&str],
    filter: &ListFilter,
) -> Result<()> {
    builder.push(" WHERE deleted_at IS NULL");

    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status);
    }

    let search = filter.search.as_deref().map(str::trim).unwrap_or_default();
    if search.len() > MAX_SEARCH_LENGTH {
        return Err(AppError::validation(format!(
            "search cannot exceed {} characters",
            MAX_SEARCH_LENGTH
        )));
    }

    if !search.is_empty() && !search_columns.is_empty() {
        let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
        builder.push(" AND (");
        let mut columns = builder.separated(" OR ");
        for column in search_columns {
            columns
                .push(format!("LOWER(COALESCE({}, '')) LIKE ", column))
                .push_bind_unseparated(pattern.clone())
                .push_unseparated(" ESCAPE '\\'");
        }
        builder.push(")");
    }

    Ok(())
}

/// Match `%`, `_` and `\` literally inside a LIKE pattern
fn escape_like(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len());
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
