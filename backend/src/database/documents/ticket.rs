//! Production tickets
//!
//! Paragon and erha tickets are the same document over different tables.
//! A ticket takes its number from the quotation pool on creation; its
//! invoice number is only drawn when the ticket is finalized
//! (see [`crate::services::LineageService::finalize_ticket`]).

use super::{
    check_line_items, fetch_record, reject_blank, reject_negative, require_text, Document,
    ParentUpdate,
};
use crate::database::models::{
    DocumentStatus, EntityKind, LineItem, Remark, Signature, Ticket, TicketInput,
};
use crate::database::numbering::{self, NumberPool};
use crate::database::reconcile::{Collection, Table};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Table layout of one ticket brand
pub trait TicketBrand: Debug + Clone + Copy + PartialEq + Send + Sync + 'static {
    const KIND: EntityKind;
    const ITEMS: Collection<LineItem>;
    const REMARKS: Collection<Remark>;
    const SIGNATURES: Collection<Signature>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paragon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erha;

impl TicketBrand for Paragon {
    const KIND: EntityKind = EntityKind::ParagonTicket;
    const ITEMS: Collection<LineItem> = Collection::nested(
        "items",
        Table::new("paragon_ticket_items", "ticket_id"),
        Table::new("paragon_ticket_item_details", "item_id"),
    );
    const REMARKS: Collection<Remark> =
        Collection::flat("remarks", Table::new("paragon_ticket_remarks", "ticket_id"));
    const SIGNATURES: Collection<Signature> =
        Collection::flat("signatures", Table::new("paragon_ticket_signatures", "ticket_id"));
}

impl TicketBrand for Erha {
    const KIND: EntityKind = EntityKind::ErhaTicket;
    const ITEMS: Collection<LineItem> = Collection::nested(
        "items",
        Table::new("erha_ticket_items", "ticket_id"),
        Table::new("erha_ticket_item_details", "item_id"),
    );
    const REMARKS: Collection<Remark> =
        Collection::flat("remarks", Table::new("erha_ticket_remarks", "ticket_id"));
    const SIGNATURES: Collection<Signature> =
        Collection::flat("signatures", Table::new("erha_ticket_signatures", "ticket_id"));
}

/// Ticket with its collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "")]
pub struct TicketDocument<B: TicketBrand> {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub items: Vec<LineItem>,
    pub remarks: Vec<Remark>,
    pub signatures: Vec<Signature>,
    #[serde(skip)]
    brand: PhantomData<B>,
}

impl<B: TicketBrand> TicketDocument<B> {
    pub fn new(
        ticket: Ticket,
        items: Vec<LineItem>,
        remarks: Vec<Remark>,
        signatures: Vec<Signature>,
    ) -> Self {
        Self {
            ticket,
            items,
            remarks,
            signatures,
            brand: PhantomData,
        }
    }
}

#[async_trait]
impl<B: TicketBrand> Document for TicketDocument<B> {
    const KIND: EntityKind = B::KIND;
    const SEARCH_COLUMNS: &'static [&'static str] =
        &["quotation_number", "invoice_number", "client_name", "event_name"];

    type Record = Ticket;
    type Input = TicketInput;

    fn id(&self) -> &str {
        &self.ticket.id
    }

    fn validate_new(input: &TicketInput) -> Result<()> {
        require_text("clientName", input.client_name.as_deref())?;
        Self::validate_update(input)
    }

    fn validate_update(input: &TicketInput) -> Result<()> {
        reject_blank("clientName", input.client_name.as_deref())?;
        reject_negative("totalAmount", input.total_amount)?;
        check_line_items(input.items.as_deref())
    }

    fn client_version(input: &TicketInput) -> Option<DateTime<Utc>> {
        input.updated_at
    }

    fn requested_status(input: &TicketInput) -> Option<DocumentStatus> {
        input.status
    }

    /// Finalizing draws an invoice number, so only `finalize_*_ticket` may do it
    fn check_status_change(from: DocumentStatus, to: DocumentStatus) -> Result<()> {
        if to == DocumentStatus::Finalized && from != DocumentStatus::Finalized {
            return Err(AppError::validation(format!(
                "A {} is finalized with finalize_{}",
                B::KIND,
                B::KIND.as_str()
            )));
        }
        Ok(())
    }

    async fn insert_parent(
        conn: &mut SqliteConnection,
        id: &str,
        input: &TicketInput,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let number = numbering::allocate(conn, NumberPool::Quotation, now.year()).await?;

        let sql = format!(
            r#"
            INSERT INTO {} (
                id, quotation_number, client_name, event_name, production_date,
                total_amount, status, notes, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            B::KIND.table()
        );

        sqlx::query(&sql)
            .bind(id)
            .bind(&number)
            .bind(input.client_name.clone().unwrap_or_default())
            .bind(input.event_name.clone().flatten())
            .bind(input.production_date.flatten())
            .bind(input.total_amount.unwrap_or(0))
            .bind(DocumentStatus::Draft)
            .bind(input.notes.clone().flatten())
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        tracing::debug!("Inserted {} {} as {}", B::KIND, id, number);
        Ok(())
    }

    async fn write_fields(
        conn: &mut SqliteConnection,
        id: &str,
        input: &TicketInput,
        version: DateTime<Utc>,
    ) -> Result<()> {
        ParentUpdate::new(B::KIND, version)
            .set("client_name", input.client_name.clone())
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
        input: TicketInput,
    ) -> Result<()> {
        if let Some(items) = input.items {
            B::ITEMS.reconcile(conn, id, items).await?;
        }
        if let Some(remarks) = input.remarks {
            B::REMARKS.reconcile(conn, id, remarks).await?;
        }
        if let Some(signatures) = input.signatures {
            B::SIGNATURES.reconcile(conn, id, signatures).await?;
        }
        Ok(())
    }

    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let Some(ticket) = fetch_record::<Ticket>(conn, B::KIND, id).await? else {
            return Ok(None);
        };

        Ok(Some(TicketDocument::new(
            ticket,
            B::ITEMS.load(conn, id).await?,
            B::REMARKS.load(conn, id).await?,
            B::SIGNATURES.load(conn, id).await?,
        )))
    }
}
