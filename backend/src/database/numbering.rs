//! Document number allocation
//!
//! Human-facing numbers look like `QTN-2026-0042`. Several tables draw from
//! the same pool (a ticket carries a quotation number and, once finalized,
//! an invoice number), so a pool's sequence is shared by all of them.
//!
//! Each pool-year has a row in `number_sequences`. The first allocation seeds
//! it from the highest number already present in any source table; every
//! allocation after that is a single atomic increment.

use crate::error::Result;
use sqlx::SqliteConnection;
use std::fmt;

/// A namespace of document numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberPool {
    Quotation,
    Invoice,
    Expense,
}

impl NumberPool {
    pub fn prefix(self) -> &'static str {
        match self {
            NumberPool::Quotation => crate::config::QUOTATION_NUMBER_PREFIX,
            NumberPool::Invoice => crate::config::INVOICE_NUMBER_PREFIX,
            NumberPool::Expense => crate::config::EXPENSE_NUMBER_PREFIX,
        }
    }

    /// Every (table, column) pair that holds numbers of this pool
    pub fn sources(self) -> &'static [(&'static str, &'static str)] {
        match self {
            NumberPool::Quotation => &[
                ("quotations", "quotation_number"),
                ("paragon_tickets", "quotation_number"),
                ("erha_tickets", "quotation_number"),
            ],
            NumberPool::Invoice => &[
                ("invoices", "invoice_number"),
                ("paragon_tickets", "invoice_number"),
                ("erha_tickets", "invoice_number"),
            ],
            NumberPool::Expense => &[("expenses", "expense_number")],
        }
    }

    fn key(self) -> &'static str {
        match self {
            NumberPool::Quotation => "quotation",
            NumberPool::Invoice => "invoice",
            NumberPool::Expense => "expense",
        }
    }
}

impl fmt::Display for NumberPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// `PREFIX-YYYY-NNNN`, padded to four digits and widening past 9999
pub fn format_number(pool: NumberPool, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", pool.prefix(), year, sequence)
}

/// Sequence part of a number belonging to `pool` and `year`
pub fn parse_number(pool: NumberPool, year: i32, number: &str) -> Option<i64> {
    let prefix = format!("{}-{}-", pool.prefix(), year);
    number.strip_prefix(&prefix)?.parse().ok()
}

/// Allocate the next number of `pool` for `year`.
///
/// Runs on the caller's connection so the allocation commits or rolls back
/// together with the insert that uses it.
pub async fn allocate(conn: &mut SqliteConnection, pool: NumberPool, year: i32) -> Result<String> {
    seed_sequence(conn, pool, year).await?;

    let sequence: i64 = sqlx::query_scalar(
        r#"
        UPDATE number_sequences SET last_value = last_value + 1
        WHERE pool = ? AND year = ?
        RETURNING last_value
        "#,
    )
    .bind(pool.key())
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;

    let number = format_number(pool, year, sequence);
    tracing::debug!("Allocated {} number {}", pool, number);
    Ok(number)
}

/// Create the pool-year sequence if missing, starting after the highest
/// number found in any source table. Concurrent seeding is harmless: the
/// losing insert is ignored.
async fn seed_sequence(conn: &mut SqliteConnection, pool: NumberPool, year: i32) -> Result<()> {
    let prefix = format!("{}-{}-", pool.prefix(), year);

    let scans: Vec<String> = pool
        .sources()
        .iter()
        .map(|(table, column)| {
            format!(
                "SELECT MAX(CAST(SUBSTR({column}, ?) AS INTEGER)) AS n FROM {table} WHERE {column} LIKE ?"
            )
        })
        .collect();

    let sql = format!(
        r#"
        INSERT INTO number_sequences (pool, year, last_value)
        SELECT ?, ?, COALESCE(MAX(n), 0) FROM ({})
        WHERE true
        ON CONFLICT(pool, year) DO NOTHING
        "#,
        scans.join(" UNION ALL ")
    );

    let mut query = sqlx::query(&sql).bind(pool.key()).bind(year);
    for _ in pool.sources() {
        query = query
            .bind(prefix.len() as i64 + 1)
            .bind(format!("{}%", prefix));
    }

    let seeded = query.execute(&mut *conn).await?.rows_affected();
    if seeded > 0 {
        tracing::info!("Created {} number sequence for {}", pool, year);
    }

    Ok(())
}
