use super::{
    check_quantity, fetch_record, reject_blank, reject_negative, require_text, Document,
    ParentUpdate,
};
use crate::database::models::{
    DocumentStatus, EntityKind, Expense, ExpenseDocument, ExpenseInput, ExpenseItem,
};
use crate::database::numbering::{self, NumberPool};
use crate::database::reconcile::{Collection, Table};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqliteConnection;

pub const EXPENSE_ITEMS: Collection<ExpenseItem> =
    Collection::flat("items", Table::new("expense_items", "expense_id"));

#[async_trait]
impl Document for ExpenseDocument {
    const KIND: EntityKind = EntityKind::Expense;
    const SEARCH_COLUMNS: &'static [&'static str] =
        &["expense_number", "description", "category", "vendor"];

    type Record = Expense;
    type Input = ExpenseInput;

    fn id(&self) -> &str {
        &self.expense.id
    }

    fn validate_new(input: &ExpenseInput) -> Result<()> {
        require_text("description", input.description.as_deref())?;
        if input.expense_date.is_none() {
            return Err(AppError::validation("expenseDate is required"));
        }
        Self::validate_update(input)
    }

    fn validate_update(input: &ExpenseInput) -> Result<()> {
        reject_blank("description", input.description.as_deref())?;
        reject_negative("totalAmount", input.total_amount)?;

        for (index, item) in input.items.as_deref().unwrap_or_default().iter().enumerate() {
            require_text(
                &format!("items[{}].description", index),
                Some(item.description.as_str()),
            )?;
            check_quantity(&format!("items[{}].quantity", index), item.quantity)?;
        }
        Ok(())
    }

    fn client_version(input: &ExpenseInput) -> Option<DateTime<Utc>> {
        input.updated_at
    }

    async fn insert_parent(
        conn: &mut SqliteConnection,
        id: &str,
        input: &ExpenseInput,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expense_date = input.expense_date.unwrap_or_else(|| now.date_naive());
        let number = numbering::allocate(conn, NumberPool::Expense, expense_date.year()).await?;

        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, expense_number, description, category, vendor, expense_date,
                total_amount, status, notes, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&number)
        .bind(input.description.clone().unwrap_or_default())
        .bind(input.category.clone().flatten())
        .bind(input.vendor.clone().flatten())
        .bind(expense_date)
        .bind(input.total_amount.unwrap_or(0))
        .bind(DocumentStatus::Draft)
        .bind(input.notes.clone().flatten())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        tracing::debug!("Inserted expense {} as {}", id, number);
        Ok(())
    }

    async fn write_fields(
        conn: &mut SqliteConnection,
        id: &str,
        input: &ExpenseInput,
        version: DateTime<Utc>,
    ) -> Result<()> {
        ParentUpdate::new(Self::KIND, version)
            .set("description", input.description.clone())
            .set("category", input.category.clone())
            .set("vendor", input.vendor.clone())
            .set("expense_date", input.expense_date)
            .set("total_amount", input.total_amount)
            .set("status", input.status)
            .set("notes", input.notes.clone())
            .execute(conn, id)
            .await
    }

    async fn reconcile_children(
        conn: &mut SqliteConnection,
        id: &str,
        input: ExpenseInput,
    ) -> Result<()> {
        if let Some(items) = input.items {
            EXPENSE_ITEMS.reconcile(conn, id, items).await?;
        }
        Ok(())
    }

    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let Some(expense) = fetch_record::<Expense>(conn, Self::KIND, id).await? else {
            return Ok(None);
        };

        Ok(Some(ExpenseDocument {
            expense,
            items: EXPENSE_ITEMS.load(conn, id).await?,
        }))
    }
}
