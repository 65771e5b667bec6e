//! Lineage service
//!
//! Operations that span documents: generating an invoice from a quotation,
//! finalizing production tickets into the invoice pool, and the cleanup
//! tooling that hard-deletes rows and severs lineage links.

use crate::database::numbering::{self, NumberPool};
use crate::database::reconcile::detached;
use crate::database::{
    Document, DocumentStatus, EntityKind, InvoiceDocument, InvoiceInput, QuotationDocument,
    Repository, TicketBrand, TicketDocument,
};
use crate::error::{AppError, Result};
use crate::hooks::{ChangeAction, ChangeEvent, PostCommitHooks};
use crate::lock;
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

#[derive(Clone)]
pub struct LineageService {
    repo: Repository,
    hooks: PostCommitHooks,
}

impl LineageService {
    pub fn new(repo: Repository, hooks: PostCommitHooks) -> Self {
        Self { repo, hooks }
    }

    /// Create an invoice from a quotation and link the two
    ///
    /// The invoice copies the quotation's parties, amount and every
    /// collection, and keeps a copy of the quotation number.
    pub async fn generate_invoice(&self, quotation_id: &str) -> Result<InvoiceDocument> {
        let mut tx = self.repo.begin_write().await?;

        let quotation = QuotationDocument::load(&mut tx, quotation_id)
            .await?
            .ok_or_else(|| AppError::not_found(EntityKind::Quotation, quotation_id))?;

        if let Some(existing) = &quotation.quotation.generated_invoice_id {
            if InvoiceDocument::load(&mut tx, existing).await?.is_some() {
                return Err(AppError::validation(format!(
                    "Quotation {} already has invoice {}",
                    quotation.quotation.quotation_number, existing
                )));
            }
        }

        let now = lock::normalize(Utc::now());
        let invoice_id = Uuid::new_v4().to_string();
        let source = quotation.quotation;

        let input = InvoiceInput {
            company_name: Some(source.company_name.clone()),
            company_address: Some(source.company_address.clone()),
            client_name: Some(source.client_name.clone()),
            client_contact: Some(source.client_contact.clone()),
            invoice_date: Some(now.date_naive()),
            total_amount: Some(source.total_amount),
            notes: Some(source.notes.clone()),
            items: Some(detached(quotation.items)),
            remarks: Some(detached(quotation.remarks)),
            signatures: Some(detached(quotation.signatures)),
            ..Default::default()
        };

        InvoiceDocument::insert_parent(&mut tx, &invoice_id, &input, now).await?;

        sqlx::query(
            r#"
            UPDATE invoices SET source_quotation_id = ?, source_quotation_number = ?
            WHERE id = ?
            "#,
        )
        .bind(&source.id)
        .bind(&source.quotation_number)
        .bind(&invoice_id)
        .execute(&mut *tx)
        .await?;

        InvoiceDocument::reconcile_children(&mut tx, &invoice_id, input).await?;

        sqlx::query("UPDATE quotations SET generated_invoice_id = ?, updated_at = ? WHERE id = ?")
            .bind(&invoice_id)
            .bind(lock::next_version(source.updated_at))
            .bind(&source.id)
            .execute(&mut *tx)
            .await?;

        let invoice = InvoiceDocument::load(&mut tx, &invoice_id)
            .await?
            .ok_or_else(|| AppError::not_found(EntityKind::Invoice, &invoice_id))?;

        tx.commit().await?;

        tracing::info!(
            "Generated invoice {} from quotation {}",
            invoice.invoice.invoice_number,
            source.quotation_number
        );

        self.hooks.fire(ChangeEvent::new(
            EntityKind::Invoice,
            invoice_id,
            ChangeAction::Created,
        ));
        self.hooks.fire(ChangeEvent::new(
            EntityKind::Quotation,
            source.id,
            ChangeAction::Updated,
        ));

        Ok(invoice)
    }

    /// Finalize a ticket, drawing an invoice number if it has none yet
    pub async fn finalize_ticket<B: TicketBrand>(&self, id: &str) -> Result<TicketDocument<B>> {
        let mut tx = self.repo.begin_write().await?;

        let current = TicketDocument::<B>::load(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(B::KIND, id))?;
        let ticket = &current.ticket;

        if !ticket.status.can_transition_to(DocumentStatus::Finalized) {
            return Err(AppError::validation(format!(
                "Cannot finalize {} {} from status {}",
                B::KIND,
                ticket.quotation_number,
                ticket.status
            )));
        }

        let invoice_number = match &ticket.invoice_number {
            Some(number) => number.clone(),
            None => numbering::allocate(&mut tx, NumberPool::Invoice, Utc::now().year()).await?,
        };

        let sql = format!(
            "UPDATE {} SET invoice_number = ?, status = ?, updated_at = ? WHERE id = ?",
            B::KIND.table()
        );
        sqlx::query(&sql)
            .bind(&invoice_number)
            .bind(DocumentStatus::Finalized)
            .bind(lock::next_version(ticket.updated_at))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let finalized = TicketDocument::<B>::load(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(B::KIND, id))?;

        tx.commit().await?;

        tracing::info!("Finalized {} {} as {}", B::KIND, id, invoice_number);
        self.hooks
            .fire(ChangeEvent::new(B::KIND, id, ChangeAction::StatusChanged));

        Ok(finalized)
    }

    /// Permanently delete a document, live or soft-deleted
    ///
    /// Deleting a quotation first copies its number onto invoices generated
    /// from it; the link itself is cleared by the schema (`ON DELETE SET
    /// NULL`) and child rows cascade. Documents that lose a link get a new
    /// version marker.
    pub async fn hard_delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let mut tx = self.repo.begin_write().await?;

        if kind == EntityKind::Quotation {
            sqlx::query(
                r#"
                UPDATE invoices
                SET source_quotation_number = COALESCE(
                    source_quotation_number,
                    (SELECT quotation_number FROM quotations WHERE id = ?)
                )
                WHERE source_quotation_id = ?
                "#,
            )
            .bind(id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let linked = touch_linked(&mut tx, kind, id).await?;

        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        let rows = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            return Err(AppError::not_found(kind, id));
        }

        tx.commit().await?;

        tracing::info!("Hard deleted {}: {}", kind, id);
        self.hooks
            .fire(ChangeEvent::new(kind, id, ChangeAction::Deleted));
        for (linked_kind, linked_id) in linked {
            self.hooks
                .fire(ChangeEvent::new(linked_kind, linked_id, ChangeAction::Updated));
        }

        Ok(())
    }

    /// Hard-delete every soft-deleted document of a kind
    pub async fn purge_deleted(&self, kind: EntityKind) -> Result<usize> {
        let ids = self.repo.soft_deleted_ids(kind).await?;

        for id in &ids {
            self.hard_delete(kind, id).await?;
        }

        if !ids.is_empty() {
            tracing::info!("Purged {} deleted {} documents", ids.len(), kind);
        }

        Ok(ids.len())
    }
}

/// Bump the version of every document linked to `kind`/`id`
async fn touch_linked(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: &str,
) -> Result<Vec<(EntityKind, String)>> {
    let (linked_kind, column) = match kind {
        EntityKind::Quotation => (EntityKind::Invoice, "source_quotation_id"),
        EntityKind::Invoice => (EntityKind::Quotation, "generated_invoice_id"),
        _ => return Ok(Vec::new()),
    };

    let sql = format!(
        "SELECT id, updated_at FROM {} WHERE {} = ?",
        linked_kind.table(),
        column
    );
    let rows = sqlx::query_as::<_, (String, DateTime<Utc>)>(&sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    let update = format!("UPDATE {} SET updated_at = ? WHERE id = ?", linked_kind.table());
    for (linked_id, updated_at) in &rows {
        sqlx::query(&update)
            .bind(lock::next_version(*updated_at))
            .bind(linked_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(rows
        .into_iter()
        .map(|(linked_id, _)| (linked_kind, linked_id))
        .collect())
}
