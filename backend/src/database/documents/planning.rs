use super::{
    check_date_range, check_stored_date_range, fetch_record, reject_blank, require_text, Document,
    ParentUpdate,
};
use crate::database::models::{
    DocumentStatus, EntityKind, Planning, PlanningDocument, PlanningInput, PlanningItem,
};
use crate::database::reconcile::{Collection, Table};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

pub const PLANNING_ITEMS: Collection<PlanningItem> =
    Collection::flat("items", Table::new("planning_items", "planning_id"));

#[async_trait]
impl Document for PlanningDocument {
    const KIND: EntityKind = EntityKind::Planning;
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "client_name", "location"];

    type Record = Planning;
    type Input = PlanningInput;

    fn id(&self) -> &str {
        &self.planning.id
    }

    fn validate_new(input: &PlanningInput) -> Result<()> {
        require_text("title", input.title.as_deref())?;
        if input.start_date.is_none() {
            return Err(AppError::validation("startDate is required"));
        }
        Self::validate_update(input)
    }

    fn validate_update(input: &PlanningInput) -> Result<()> {
        reject_blank("title", input.title.as_deref())?;
        check_date_range(input.start_date, input.end_date.flatten(), "endDate")?;

        for (index, item) in input.items.as_deref().unwrap_or_default().iter().enumerate() {
            require_text(&format!("items[{}].activity", index), Some(item.activity.as_str()))?;
        }
        Ok(())
    }

    fn client_version(input: &PlanningInput) -> Option<DateTime<Utc>> {
        input.updated_at
    }

    async fn insert_parent(
        conn: &mut SqliteConnection,
        id: &str,
        input: &PlanningInput,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO plannings (
                id, title, client_name, start_date, end_date, location, status, notes,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(input.title.clone().unwrap_or_default())
        .bind(input.client_name.clone().flatten())
        .bind(input.start_date.unwrap_or_else(|| now.date_naive()))
        .bind(input.end_date.flatten())
        .bind(input.location.clone().flatten())
        .bind(DocumentStatus::Draft)
        .bind(input.notes.clone().flatten())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn write_fields(
        conn: &mut SqliteConnection,
        id: &str,
        input: &PlanningInput,
        version: DateTime<Utc>,
    ) -> Result<()> {
        ParentUpdate::new(Self::KIND, version)
            .set("title", input.title.clone())
            .set("client_name", input.client_name.clone())
            .set("start_date", input.start_date)
            .set("end_date", input.end_date)
            .set("location", input.location.clone())
            .set("status", input.status)
            .set("notes", input.notes.clone())
            .execute(&mut *conn, id)
            .await?;

        if input.start_date.is_some() || input.end_date.is_some() {
            check_stored_date_range(
                conn,
                Self::KIND,
                id,
                ("start_date", "end_date"),
                "endDate",
            )
            .await?;
        }
        Ok(())
    }

    async fn reconcile_children(
        conn: &mut SqliteConnection,
        id: &str,
        input: PlanningInput,
    ) -> Result<()> {
        if let Some(items) = input.items {
            PLANNING_ITEMS.reconcile(conn, id, items).await?;
        }
        Ok(())
    }

    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let Some(planning) = fetch_record::<Planning>(conn, Self::KIND, id).await? else {
            return Ok(None);
        };

        Ok(Some(PlanningDocument {
            planning,
            items: PLANNING_ITEMS.load(conn, id).await?,
        }))
    }
}
