//! Document definitions
//!
//! A document is a parent row plus its ordered child collections. Each kind
//! describes its parent table, how scalar fields are written and which
//! collections it owns; the update algorithm itself lives in
//! [`crate::services::DocumentService`] and [`crate::database::reconcile`].

mod expense;
mod invoice;
mod planning;
mod quotation;
mod rows;
mod ticket;

pub use quotation::{QUOTATION_ITEMS, QUOTATION_REMARKS, QUOTATION_SIGNATURES};
pub use invoice::{INVOICE_ITEMS, INVOICE_REMARKS, INVOICE_SIGNATURES};
pub use ticket::{Erha, Paragon, TicketBrand, TicketDocument};

use super::models::{DocumentStatus, EntityKind, ItemDetail, LineItem};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Encode, FromRow, QueryBuilder, Sqlite, SqliteConnection, Type};

/// A reconcilable document kind
///
/// Implemented on the document tree type (parent record plus collections).
#[async_trait]
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    /// Columns matched by list searches
    const SEARCH_COLUMNS: &'static [&'static str];

    type Record: for<'r> FromRow<'r, SqliteRow>
        + Serialize
        + DeserializeOwned
        + Clone
        + Send
        + Sync
        + Unpin;

    type Input: DeserializeOwned + Send + Sync;

    fn id(&self) -> &str;

    /// Required fields for creation, on top of [`Document::validate_update`]
    fn validate_new(input: &Self::Input) -> Result<()>;

    fn validate_update(input: &Self::Input) -> Result<()>;

    /// The optimistic-lock token sent by the client
    fn client_version(input: &Self::Input) -> Option<DateTime<Utc>>;

    /// The status of a status-only payload eligible for the fast path
    fn status_only(_input: &Self::Input) -> Option<DocumentStatus> {
        None
    }

    /// The status a full update asks for, if this kind guards status moves
    fn requested_status(_input: &Self::Input) -> Option<DocumentStatus> {
        None
    }

    /// Reject moves this kind only allows through a dedicated operation
    fn check_status_change(_from: DocumentStatus, _to: DocumentStatus) -> Result<()> {
        Ok(())
    }

    /// Insert the parent row in `draft`, allocating any document number
    async fn insert_parent(
        conn: &mut SqliteConnection,
        id: &str,
        input: &Self::Input,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Write the scalar fields present in `input` and the new version marker
    async fn write_fields(
        conn: &mut SqliteConnection,
        id: &str,
        input: &Self::Input,
        version: DateTime<Utc>,
    ) -> Result<()>;

    /// Reconcile every collection present in `input`
    async fn reconcile_children(
        conn: &mut SqliteConnection,
        id: &str,
        input: Self::Input,
    ) -> Result<()>;

    /// Load the live document with collections ordered by `order`
    async fn load(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>>;
}

/// Fetch a live (not soft-deleted) parent record
pub async fn fetch_record<R>(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: &str,
) -> Result<Option<R>>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!(
        "SELECT * FROM {} WHERE id = ? AND deleted_at IS NULL",
        kind.table()
    );

    let record = sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record)
}

/// `UPDATE … SET` builder for the scalar fields of a parent row
///
/// The version marker is always written; other columns only when present.
pub struct ParentUpdate {
    kind: EntityKind,
    builder: QueryBuilder<'static, Sqlite>,
}

impl ParentUpdate {
    pub fn new(kind: EntityKind, version: DateTime<Utc>) -> Self {
        let mut builder = QueryBuilder::new(format!("UPDATE {} SET updated_at = ", kind.table()));
        builder.push_bind(version);
        Self { kind, builder }
    }

    pub fn set<T>(&mut self, column: &str, value: Option<T>) -> &mut Self
    where
        T: 'static + Encode<'static, Sqlite> + Type<Sqlite> + Send,
    {
        if let Some(value) = value {
            self.builder.push(", ").push(column).push(" = ").push_bind(value);
        }
        self
    }

    /// Apply to a live row; a missing or soft-deleted row is `NotFound`
    pub async fn execute(&mut self, conn: &mut SqliteConnection, id: &str) -> Result<()> {
        self.builder.push(" WHERE id = ").push_bind(id.to_string());
        self.builder.push(" AND deleted_at IS NULL");

        let rows = self.builder.build().execute(&mut *conn).await?.rows_affected();
        if rows == 0 {
            return Err(AppError::not_found(self.kind, id));
        }

        Ok(())
    }
}

// ===== Validation helpers =====

/// A field that must be present and non-blank
pub(crate) fn require_text(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(AppError::validation(format!("{} is required", field))),
    }
}

/// A field that may be absent but not blank when given
pub(crate) fn reject_blank(field: &str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(AppError::validation(format!("{} cannot be empty", field)))
        }
        _ => Ok(()),
    }
}

pub(crate) fn reject_negative(field: &str, value: Option<i64>) -> Result<()> {
    match value {
        Some(v) if v < 0 => Err(AppError::validation(format!("{} cannot be negative", field))),
        _ => Ok(()),
    }
}

pub(crate) fn check_quantity(field: &str, quantity: f64) -> Result<()> {
    if quantity.is_finite() && quantity >= 0.0 {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "{} must be a non-negative number",
            field
        )))
    }
}

pub(crate) fn check_date_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    field: &str,
) -> Result<()> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(AppError::validation(format!(
            "{} cannot be before the start date",
            field
        ))),
        _ => Ok(()),
    }
}

/// Check a date range as stored, after a partial update wrote either end
pub(crate) async fn check_stored_date_range(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    id: &str,
    columns: (&str, &str),
    field: &str,
) -> Result<()> {
    let sql = format!(
        "SELECT {}, {} FROM {} WHERE id = ?",
        columns.0,
        columns.1,
        kind.table()
    );

    let stored = sqlx::query_as::<_, (Option<NaiveDate>, Option<NaiveDate>)>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match stored {
        Some((start, end)) => check_date_range(start, end, field),
        None => Err(AppError::not_found(kind, id)),
    }
}

pub(crate) fn check_line_items(items: Option<&[LineItem]>) -> Result<()> {
    for (index, item) in items.unwrap_or_default().iter().enumerate() {
        require_text(&format!("items[{}].productName", index), Some(item.product_name.as_str()))?;
        check_quantity(&format!("items[{}].quantity", index), item.quantity)?;
        check_details(index, &item.details)?;
    }
    Ok(())
}

fn check_details(item: usize, details: &[ItemDetail]) -> Result<()> {
    for (index, detail) in details.iter().enumerate() {
        require_text(
            &format!("items[{}].details[{}].description", item, index),
            Some(detail.description.as_str()),
        )?;
        check_quantity(
            &format!("items[{}].details[{}].quantity", item, index),
            detail.quantity,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text() {
        assert!(require_text("clientName", Some("Acme")).is_ok());
        assert!(require_text("clientName", Some("  ")).is_err());
        assert!(require_text("clientName", None).is_err());
    }

    #[test]
    fn test_reject_blank_allows_absent() {
        assert!(reject_blank("companyName", None).is_ok());
        assert!(reject_blank("companyName", Some("")).is_err());
    }

    #[test]
    fn test_line_item_validation_points_at_field() {
        let items = vec![LineItem {
            product_name: "Stage".to_string(),
            quantity: 1.0,
            details: vec![ItemDetail {
                description: " ".to_string(),
                quantity: 1.0,
                ..Default::default()
            }],
            ..Default::default()
        }];

        let err = check_line_items(Some(items.as_slice())).unwrap_err();
        assert!(err.to_string().contains("items[0].details[0].description"));
    }

    #[test]
    fn test_quantity_must_be_finite() {
        assert!(check_quantity("quantity", f64::NAN).is_err());
        assert!(check_quantity("quantity", -1.0).is_err());
        assert!(check_quantity("quantity", 2.5).is_ok());
    }

    #[test]
    fn test_date_range() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 10);
        let before = NaiveDate::from_ymd_opt(2026, 3, 9);
        assert!(check_date_range(start, before, "endDate").is_err());
        assert!(check_date_range(start, start, "endDate").is_ok());
        assert!(check_date_range(None, before, "endDate").is_ok());
    }
}
