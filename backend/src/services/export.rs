//! CSV export
//!
//! Writes the live documents of each kind to a spreadsheet-friendly CSV file.
//! Exports only read committed rows and never touch the write path.

use crate::database::{DocumentStatus, EntityKind, Repository};
use crate::error::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::path::{Path, PathBuf};

/// One exported document
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ExportRow {
    pub id: String,
    pub number: Option<String>,
    pub party: Option<String>,
    pub document_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: DocumentStatus,
    pub total_amount: i64,
}

/// Result of an export run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
    pub rows: usize,
}

#[derive(Clone)]
pub struct ExportService {
    repo: Repository,
}

impl ExportService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Write `{kind}.csv` into `dir` and return its path
    pub async fn export_kind(&self, kind: EntityKind, dir: &Path) -> Result<(PathBuf, usize)> {
        let rows = self.rows(kind).await?;
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.csv", kind));
        let written = rows.len();
        let target = path.clone();

        // csv writes synchronously
        tokio::task::spawn_blocking(move || write_csv(&target, &rows))
            .await
            .map_err(|e| crate::error::AppError::Generic(format!("Export task failed: {}", e)))??;

        tracing::debug!("Exported {} {} rows to {:?}", written, kind, path);
        Ok((path, written))
    }

    /// Export every kind into a fresh timestamped directory under `dir`
    pub async fn export_all(&self, dir: &Path) -> Result<ExportReport> {
        let directory = dir.join(format!("export_{}", Utc::now().format("%Y%m%d_%H%M%S")));

        let mut files = Vec::with_capacity(EntityKind::ALL.len());
        let mut rows = 0;
        for kind in EntityKind::ALL {
            let (path, written) = self.export_kind(kind, &directory).await?;
            files.push(path);
            rows += written;
        }

        tracing::info!("Export finished: {} rows in {:?}", rows, directory);
        Ok(ExportReport {
            directory,
            files,
            rows,
        })
    }

    async fn rows(&self, kind: EntityKind) -> Result<Vec<ExportRow>> {
        let (number, party, date, end_date) = match kind {
            EntityKind::Quotation | EntityKind::ParagonTicket | EntityKind::ErhaTicket => {
                ("quotation_number", "client_name", "production_date", "NULL")
            }
            EntityKind::Invoice => ("invoice_number", "client_name", "invoice_date", "due_date"),
            EntityKind::Planning => ("title", "client_name", "start_date", "end_date"),
            EntityKind::Expense => ("expense_number", "vendor", "expense_date", "NULL"),
        };
        let amount = kind.amount_column().unwrap_or("0");

        let sql = format!(
            r#"
            SELECT id, {} AS number, {} AS party, {} AS document_date, {} AS end_date,
                   status, {} AS total_amount
            FROM {}
            WHERE deleted_at IS NULL
            ORDER BY created_at, id
            "#,
            number,
            party,
            date,
            end_date,
            amount,
            kind.table()
        );

        let rows = sqlx::query_as::<_, ExportRow>(&sql)
            .fetch_all(self.repo.pool())
            .await?;

        Ok(rows)
    }
}

fn write_csv(path: &Path, rows: &[ExportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record([
            "id",
            "number",
            "party",
            "document_date",
            "end_date",
            "status",
            "total_amount",
        ])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::database::{create_memory_pool, InvoiceDocument, QuotationDocument};
    use crate::hooks::PostCommitHooks;
    use crate::services::DocumentService;
    use serde_json::json;
    use tempfile::TempDir;

    async fn seeded() -> Repository {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let quotations: DocumentService<QuotationDocument> =
            DocumentService::new(repo.clone(), Cache::disabled(), PostCommitHooks::new());
        let invoices: DocumentService<InvoiceDocument> =
            DocumentService::new(repo.clone(), Cache::disabled(), PostCommitHooks::new());

        let kept = quotations
            .create(
                serde_json::from_value(json!({
                    "companyName": "Studio",
                    "clientName": "Acme, Inc",
                    "productionDate": "2026-05-01",
                    "totalAmount": 1500
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        let dropped = quotations
            .create(
                serde_json::from_value(json!({"companyName": "Studio", "clientName": "Gone"}))
                    .unwrap(),
            )
            .await
            .unwrap();
        quotations.soft_delete(&dropped.quotation.id).await.unwrap();
        assert_ne!(kept.quotation.id, dropped.quotation.id);

        invoices
            .create(
                serde_json::from_value(json!({
                    "companyName": "Studio",
                    "clientName": "Acme",
                    "invoiceDate": "2026-05-02",
                    "dueDate": "2026-06-01",
                    "totalAmount": 1500
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        repo
    }

    #[tokio::test]
    async fn test_export_kind_skips_deleted() {
        let repo = seeded().await;
        let dir = TempDir::new().unwrap();

        let (path, rows) = ExportService::new(repo)
            .export_kind(EntityKind::Quotation, dir.path())
            .await
            .unwrap();

        assert_eq!(rows, 1);
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[2], "party");
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][2], "Acme, Inc");
        assert_eq!(&records[0][3], "2026-05-01");
        assert_eq!(&records[0][5], "draft");
        assert_eq!(&records[0][6], "1500");
    }

    #[tokio::test]
    async fn test_export_all_writes_one_file_per_kind() {
        let repo = seeded().await;
        let dir = TempDir::new().unwrap();

        let report = ExportService::new(repo).export_all(dir.path()).await.unwrap();

        assert_eq!(report.files.len(), EntityKind::ALL.len());
        assert_eq!(report.rows, 2);
        assert!(report.directory.starts_with(dir.path()));
        for file in &report.files {
            assert!(file.exists());
        }

        // empty kinds still get a header row
        let planning = std::fs::read_to_string(report.directory.join("planning.csv")).unwrap();
        assert!(planning.starts_with("id,number,party"));
    }
}
