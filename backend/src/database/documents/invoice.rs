use super::{
    check_date_range, check_line_items, check_stored_date_range, fetch_record, reject_blank,
    reject_negative, require_text, Document, ParentUpdate,
};
use crate::database::models::{
    DocumentStatus, EntityKind, Invoice, InvoiceDocument, InvoiceInput, LineItem, Remark,
    Signature,
};
use crate::database::numbering::{self, NumberPool};
use crate::database::reconcile::{Collection, Table};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqliteConnection;

pub const INVOICE_ITEMS: Collection<LineItem> = Collection::nested(
    "items",
    Table::new("invoice_items", "invoice_id"),
    Table::new("invoice_item_details", "item_id"),
);

pub const INVOICE_REMARKS: Collection<Remark> =
    Collection::flat("remarks", Table::new("invoice_remarks", "invoice_id"));

pub const INVOICE_SIGNATURES: Collection<Signature> =
    Collection::flat("signatures", Table::new("invoice_signatures", "invoice_id"));

#[async_trait]
impl Document for InvoiceDocument {
    const KIND: EntityKind = EntityKind::Invoice;
    const SEARCH_COLUMNS: &'static [&'static str] = &[
        "invoice_number",
        "company_name",
        "client_name",
        "source_quotation_number",
    ];

    type Record = Invoice;
    type Input = InvoiceInput;

    fn id(&self) -> &str {
        &self.invoice.id
    }

    fn validate_new(input: &InvoiceInput) -> Result<()> {
        require_text("companyName", input.company_name.as_deref())?;
        require_text("clientName", input.client_name.as_deref())?;
        if input.invoice_date.is_none() {
            return Err(AppError::validation("invoiceDate is required"));
        }
        Self::validate_update(input)
    }

    fn validate_update(input: &InvoiceInput) -> Result<()> {
        reject_blank("companyName", input.company_name.as_deref())?;
        reject_blank("clientName", input.client_name.as_deref())?;
        reject_negative("totalAmount", input.total_amount)?;
        check_date_range(input.invoice_date, input.due_date.flatten(), "dueDate")?;
        check_line_items(input.items.as_deref())
    }

    fn client_version(input: &InvoiceInput) -> Option<DateTime<Utc>> {
        input.updated_at
    }

    async fn insert_parent(
        conn: &mut SqliteConnection,
        id: &str,
        input: &InvoiceInput,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let invoice_date = input.invoice_date.unwrap_or_else(|| now.date_naive());
        let number = numbering::allocate(conn, NumberPool::Invoice, invoice_date.year()).await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, company_name, company_address, client_name, client_contact,
                invoice_date, due_date, total_amount, status, notes, created_at, updated_at
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
        .bind(invoice_date)
        .bind(input.due_date.flatten())
        .bind(input.total_amount.unwrap_or(0))
        .bind(DocumentStatus::Draft)
        .bind(input.notes.clone().flatten())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        tracing::debug!("Inserted invoice {} as {}", id, number);
        Ok(())
    }

    async fn write_fields(
        conn: &mut SqliteConnection,
        id: &str,
        input: &InvoiceInput,
        version: DateTime<Utc>,
    ) -> Result<()> {
        ParentUpdate::new(Self::KIND, version)
            .set("company_name", input.company_name.clone())
            .set("company_address", input.company_address.clone())
            .set("client_name", input.client_name.clone())
            .set("client_contact", input.client_contact.clone())
            .set("invoice_date", input.invoice_date)
            .set("due_date", input.due_date)
            .set("total_amount", input.total_amount)
            .set("status", input.status)
            .set("notes", input.notes.clone())
            .execute(&mut *conn, id)
            .await?;

        if input.invoice_date.is_some() || input.due_date.is_some() {
            check_stored_date_range(
                conn,
                Self::KIND,
                id,
                ("invoice_date", "due_date"),
                "dueDate",
            )
            .await?;
        }
        Ok(())
    }

    async fn reconcile_children(
        conn: &mut SqliteConnection,
        id: &str,
        input: InvoiceInput,
    ) -> Result<()> {
        if let Some(items) = input.items {
            INVOICE_ITEMS.reconcile(conn, id, items).await?;
        }
        if let Some(remarks) = input.remarks {
            INVOICE_REMARKS.reconcile(conn, id, remarks).await?;
        }
        if let Some(signatures) = input.signatures {
            INVOICE_SIGNATURES.reconcile(conn, id, signatures).await?;
        }
        Ok(())
    }

    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let Some(invoice) = fetch_record::<Invoice>(conn, Self::KIND, id).await? else {
            return Ok(None);
        };

        Ok(Some(InvoiceDocument {
            invoice,
            items: INVOICE_ITEMS.load(conn, id).await?,
            remarks: INVOICE_REMARKS.load(conn, id).await?,
            signatures: INVOICE_SIGNATURES.load(conn, id).await?,
        }))
    }
}
