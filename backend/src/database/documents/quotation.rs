use super::{
    check_line_items, fetch_record, reject_blank, reject_negative, require_text, Document,
    ParentUpdate,
};
use crate::database::models::{
    DocumentStatus, EntityKind, LineItem, Quotation, QuotationDocument, QuotationInput, Remark,
    Signature,
};
use crate::database::numbering::{self, NumberPool};
use crate::database::reconcile::{Collection, Table};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqliteConnection;

pub const QUOTATION_ITEMS: Collection<LineItem> = Collection::nested(
    "items",
    Table::new("quotation_items", "quotation_id"),
    Table::new("quotation_item_details", "item_id"),
);

pub const QUOTATION_REMARKS: Collection<Remark> =
    Collection::flat("remarks", Table::new("quotation_remarks", "quotation_id"));

pub const QUOTATION_SIGNATURES: Collection<Signature> =
    Collection::flat("signatures", Table::new("quotation_signatures", "quotation_id"));

#[async_trait]
impl Document for QuotationDocument {
    const KIND: EntityKind = EntityKind::Quotation;
    const SEARCH_COLUMNS: &'static [&'static str] =
        &["quotation_number", "company_name", "client_name", "event_name"];

    type Record = Quotation;
    type Input = QuotationInput;

    fn id(&self) -> &str {
        &self.quotation.id
    }

    fn validate_new(input: &QuotationInput) -> Result<()> {
        require_text("companyName", input.company_name.as_deref())?;
        require_text("clientName", input.client_name.as_deref())?;
        Self::validate_update(input)
    }

    fn validate_update(input: &QuotationInput) -> Result<()> {
        reject_blank("companyName", input.company_name.as_deref())?;
        reject_blank("clientName", input.client_name.as_deref())?;
        reject_negative("totalAmount", input.total_amount)?;
        check_line_items(input.items.as_deref())
    }

    fn client_version(input: &QuotationInput) -> Option<DateTime<Utc>> {
        input.updated_at
    }

    fn status_only(input: &QuotationInput) -> Option<DocumentStatus> {
        if input.is_status_only() {
            input.status
        } else {
            None
        }
    }

    async fn insert_parent(
        conn: &mut SqliteConnection,
        id: &str,
        input: &QuotationInput,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let number = numbering::allocate(conn, NumberPool::Quotation, now.year()).await?;

        sqlx::query(
            r#"
            INSERT INTO quotations (
                id, quotation_number, company_name, company_address, client_name,
                client_contact, event_name, production_date, total_amount, status, notes,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&number)
        .bind(input.company_name.clone().unwrap_or_default())
        .bind(input.company_address.clone().flatten())
        .bind(input.client_name.clone().unwrap_or_default())
        .bind(input.client_contact.clone().flatten())
        .bind(input.event_name.clone().flatten())
        .bind(input.production_date.flatten())
        .bind(input.total_amount.unwrap_or(0))
        .bind(DocumentStatus::Draft)
        .bind(input.notes.clone().flatten())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        tracing::debug!("Inserted quotation {} as {}", id, number);
        Ok(())
    }

    async fn write_fields(
        conn: &mut SqliteConnection,
        id: &str,
        input: &QuotationInput,
        version: DateTime<Utc>,
    ) -> Result<()> {
        ParentUpdate::new(Self::KIND, version)
            .set("company_name", input.company_name.clone())
            .set("company_address", input.company_address.clone())
            .set("client_name", input.client_name.clone())
            .set("client_contact", input.client_contact.clone())
            .set("event_name", input.event_name.clone())
            .set("production_date", input.production_date)
            .set("total_amount", input.total_amount)
            .set("status", input.status)
            .set("notes", input.notes.clone())
            .execute(conn, id)
            .await
    }

    async fn reconcile_children(
        conn: &mut SqliteConnection,
        id: &str,
        input: QuotationInput,
    ) -> Result<()> {
        if let Some(items) = input.items {
            QUOTATION_ITEMS.reconcile(conn, id, items).await?;
        }
        if let Some(remarks) = input.remarks {
            QUOTATION_REMARKS.reconcile(conn, id, remarks).await?;
        }
        if let Some(signatures) = input.signatures {
            QUOTATION_SIGNATURES.reconcile(conn, id, signatures).await?;
        }
        Ok(())
    }

    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let Some(quotation) = fetch_record::<Quotation>(conn, Self::KIND, id).await? else {
            return Ok(None);
        };

        Ok(Some(QuotationDocument {
            quotation,
            items: QUOTATION_ITEMS.load(conn, id).await?,
            remarks: QUOTATION_REMARKS.load(conn, id).await?,
            signatures: QUOTATION_SIGNATURES.load(conn, id).await?,
        }))
    }
}
