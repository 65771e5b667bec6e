//! Database models
//!
//! Rust structs representing database entities.
//! All models use serde for serialization to clients; the wire format is
//! camelCase, columns are snake_case.
//!
//! Child rows carry `id: Option<String>`: persisted rows always have one,
//! rows created by a client before their first save do not.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Lifecycle status shared by every document kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Pending,
    Accepted,
    Paid,
    Finalized,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 5] = [
        DocumentStatus::Draft,
        DocumentStatus::Pending,
        DocumentStatus::Accepted,
        DocumentStatus::Paid,
        DocumentStatus::Finalized,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Pending => "pending",
            DocumentStatus::Accepted => "accepted",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Finalized => "finalized",
        }
    }

    /// Whether a dedicated status update may move from `self` to `next`
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Draft)
                | (Pending, Accepted)
                | (Pending, Paid)
                | (Pending, Finalized)
                | (Accepted, Paid)
                | (Accepted, Finalized)
                | (Paid, Finalized)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The document kinds managed by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Quotation,
    Invoice,
    ParagonTicket,
    ErhaTicket,
    Planning,
    Expense,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Quotation,
        EntityKind::Invoice,
        EntityKind::ParagonTicket,
        EntityKind::ErhaTicket,
        EntityKind::Planning,
        EntityKind::Expense,
    ];

    /// Stable name, also used as the cache key stem
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Quotation => "quotation",
            EntityKind::Invoice => "invoice",
            EntityKind::ParagonTicket => "paragon_ticket",
            EntityKind::ErhaTicket => "erha_ticket",
            EntityKind::Planning => "planning",
            EntityKind::Expense => "expense",
        }
    }

    /// Parent table holding documents of this kind
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Quotation => "quotations",
            EntityKind::Invoice => "invoices",
            EntityKind::ParagonTicket => "paragon_tickets",
            EntityKind::ErhaTicket => "erha_tickets",
            EntityKind::Planning => "plannings",
            EntityKind::Expense => "expenses",
        }
    }

    /// Column summed by the dashboard, if the kind has an amount
    pub fn amount_column(self) -> Option<&'static str> {
        match self {
            EntityKind::Planning => None,
            _ => Some("total_amount"),
        }
    }

    /// Kinds that show up on the production calendar
    pub fn on_calendar(self) -> bool {
        matches!(
            self,
            EntityKind::Quotation | EntityKind::ParagonTicket | EntityKind::ErhaTicket
        )
    }

    pub fn is_ticket(self) -> bool {
        matches!(self, EntityKind::ParagonTicket | EntityKind::ErhaTicket)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown document kind: {}", s))
    }
}

// ===== Child rows =====

fn default_quantity() -> f64 {
    1.0
}

/// Line item of a quotation, invoice or ticket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub product_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: i64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    #[sqlx(rename = "sort_order")]
    pub order: i64,
    #[serde(default)]
    #[sqlx(skip)]
    pub details: Vec<ItemDetail>,
}

/// Detail line owned by a [`LineItem`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: i64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    #[sqlx(rename = "sort_order")]
    pub order: i64,
}

/// Checklist remark attached to a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Remark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    #[sqlx(rename = "sort_order")]
    pub order: i64,
}

/// Signature block printed at the bottom of a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub position: String,
    /// Base64 data URL of the signature image
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    #[sqlx(rename = "sort_order")]
    pub order: i64,
}

/// Scheduled activity of a production planning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlanningItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub activity: String,
    #[serde(default)]
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_done: bool,
    #[serde(default)]
    #[sqlx(rename = "sort_order")]
    pub order: i64,
}

/// Single cost line of an expense
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: i64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    #[sqlx(rename = "sort_order")]
    pub order: i64,
}

// ===== Parent records =====

/// Price quotation sent to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Quotation {
    pub id: String,
    pub quotation_number: String,
    pub company_name: String,
    pub company_address: Option<String>,
    pub client_name: String,
    pub client_contact: Option<String>,
    pub event_name: Option<String>,
    pub production_date: Option<NaiveDate>,
    pub total_amount: i64,
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub generated_invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Invoice, optionally generated from a quotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub company_name: String,
    pub company_address: Option<String>,
    pub client_name: String,
    pub client_contact: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: i64,
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub source_quotation_id: Option<String>,
    /// Copy of the source quotation number that survives its deletion
    pub source_quotation_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Production ticket; paragon and erha tickets share this shape
///
/// A ticket draws its quotation number from the quotation pool when it is
/// created and an invoice number from the invoice pool when finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub quotation_number: String,
    pub invoice_number: Option<String>,
    pub client_name: String,
    pub event_name: Option<String>,
    pub production_date: Option<NaiveDate>,
    pub total_amount: i64,
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Production planning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Planning {
    pub id: String,
    pub title: String,
    pub client_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub location: Option<String>,
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Business expense
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub expense_number: String,
    pub description: String,
    pub category: Option<String>,
    pub vendor: Option<String>,
    pub expense_date: NaiveDate,
    pub total_amount: i64,
    pub status: DocumentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// ===== Document trees =====

/// Quotation with all of its child collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationDocument {
    #[serde(flatten)]
    pub quotation: Quotation,
    pub items: Vec<LineItem>,
    pub remarks: Vec<Remark>,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDocument {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<LineItem>,
    pub remarks: Vec<Remark>,
    pub signatures: Vec<Signature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningDocument {
    #[serde(flatten)]
    pub planning: Planning,
    pub items: Vec<PlanningItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseDocument {
    #[serde(flatten)]
    pub expense: Expense,
    pub items: Vec<ExpenseItem>,
}

// ===== Inputs =====

/// Deserialize a present field (including an explicit `null`) as `Some`.
///
/// Combined with `#[serde(default)]` this tells "absent" (`None`) apart from
/// "set to null" (`Some(None)`).
fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Create or update payload for a quotation
///
/// Absent fields are left untouched on update. An absent collection is not
/// reconciled; an empty one removes every row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationInput {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub company_address: Option<Option<String>>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub client_contact: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub event_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub production_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub items: Option<Vec<LineItem>>,
    #[serde(default)]
    pub remarks: Option<Vec<Remark>>,
    #[serde(default)]
    pub signatures: Option<Vec<Signature>>,
}

impl QuotationInput {
    /// True when the payload carries nothing but a status
    pub fn is_status_only(&self) -> bool {
        self.status.is_some()
            && self.updated_at.is_none()
            && self.company_name.is_none()
            && self.company_address.is_none()
            && self.client_name.is_none()
            && self.client_contact.is_none()
            && self.event_name.is_none()
            && self.production_date.is_none()
            && self.total_amount.is_none()
            && self.notes.is_none()
            && self.items.is_none()
            && self.remarks.is_none()
            && self.signatures.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceInput {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub company_address: Option<Option<String>>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub client_contact: Option<Option<String>>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "present")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub items: Option<Vec<LineItem>>,
    #[serde(default)]
    pub remarks: Option<Vec<Remark>>,
    #[serde(default)]
    pub signatures: Option<Vec<Signature>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketInput {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub event_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub production_date: Option<Option<NaiveDate>>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub items: Option<Vec<LineItem>>,
    #[serde(default)]
    pub remarks: Option<Vec<Remark>>,
    #[serde(default)]
    pub signatures: Option<Vec<Signature>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningInput {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub client_name: Option<Option<String>>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "present")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present")]
    pub location: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub items: Option<Vec<PlanningItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub vendor: Option<Option<String>>,
    #[serde(default)]
    pub expense_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_amount: Option<i64>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default, deserialize_with = "present")]
    pub notes: Option<Option<String>>,
    #[serde(default)]
    pub items: Option<Vec<ExpenseItem>>,
}

// ===== Listing =====

/// Filters for list queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// One page of list results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

// ===== Bookkeeping =====

/// Committed change, as recorded by the activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub entity_kind: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// Backup record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub size: i64,
    pub manifest_hash: String,
}
