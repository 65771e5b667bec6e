//! Document service
//!
//! One generic service drives create/read/update/delete for every document
//! kind. An update runs in a fixed order:
//!
//! 1. input validation
//! 2. optimistic lock check against the stored version marker
//! 3. one transaction: scalar fields, every present collection, re-read
//! 4. commit
//! 5. post-commit hooks, in the background
//!
//! Steps 1 and 2 fail before any transaction is opened. Hooks never run for
//! a write that did not commit.

use crate::cache::{keys, Cache};
use crate::config::{DOCUMENT_CACHE_TTL_SECS, LIST_CACHE_TTL_SECS};
use crate::database::{Document, DocumentStatus, ListFilter, Page, Repository};
use crate::error::{AppError, Result};
use crate::hooks::{ChangeAction, ChangeEvent, PostCommitHooks};
use crate::lock;
use chrono::Utc;
use std::marker::PhantomData;
use std::time::Duration;
use uuid::Uuid;

/// CRUD service for documents of type `D`
pub struct DocumentService<D: Document> {
    repo: Repository,
    cache: Cache,
    hooks: PostCommitHooks,
    kind: PhantomData<fn() -> D>,
}

impl<D: Document> Clone for DocumentService<D> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            cache: self.cache.clone(),
            hooks: self.hooks.clone(),
            kind: PhantomData,
        }
    }
}

impl<D: Document> DocumentService<D> {
    pub fn new(repo: Repository, cache: Cache, hooks: PostCommitHooks) -> Self {
        Self {
            repo,
            cache,
            hooks,
            kind: PhantomData,
        }
    }

    /// Create a document in `draft`, allocating its number if it has one
    pub async fn create(&self, input: D::Input) -> Result<D> {
        D::validate_new(&input)?;

        let id = Uuid::new_v4().to_string();
        let now = lock::normalize(Utc::now());

        let mut tx = self.repo.pool().begin().await?;
        D::insert_parent(&mut tx, &id, &input, now).await?;
        D::reconcile_children(&mut tx, &id, input).await?;
        let document = D::load(&mut tx, &id)
            .await?
            .ok_or_else(|| AppError::not_found(D::KIND, &id))?;
        tx.commit().await?;

        tracing::info!("Created {}: {}", D::KIND, id);
        self.hooks
            .fire(ChangeEvent::new(D::KIND, id, ChangeAction::Created));

        Ok(document)
    }

    /// Live document by id, read through the cache
    pub async fn get(&self, id: &str) -> Result<D> {
        let key = keys::document(D::KIND, id);
        if let Some(document) = self.cache.get_json::<D>(&key).await {
            return Ok(document);
        }

        let document = self.load(id).await?;
        self.cache
            .set_json(&key, &document, Duration::from_secs(DOCUMENT_CACHE_TTL_SECS))
            .await;

        Ok(document)
    }

    /// One page of live parent records, read through the cache
    pub async fn list(&self, filter: ListFilter) -> Result<Page<D::Record>> {
        let key = keys::list(D::KIND, &filter);
        if let Some(page) = self.cache.get_json::<Page<D::Record>>(&key).await {
            return Ok(page);
        }

        let page = self
            .repo
            .list_records::<D::Record>(D::KIND, D::SEARCH_COLUMNS, &filter)
            .await?;
        self.cache
            .set_json(&key, &page, Duration::from_secs(LIST_CACHE_TTL_SECS))
            .await;

        Ok(page)
    }

    /// Reconcile a document against an incoming snapshot.
    ///
    /// A status-only payload takes the single-field path instead, with no
    /// lock check (see [`DocumentService::update_status`]).
    pub async fn update(&self, id: &str, input: D::Input) -> Result<D> {
        if let Some(status) = D::status_only(&input) {
            tracing::debug!("Status-only update of {} {}", D::KIND, id);
            return self.update_status(id, status).await;
        }

        D::validate_update(&input)?;

        let (current, from) = self.repo.version_of(D::KIND, id).await?;
        lock::verify(D::client_version(&input), current)?;
        if let Some(to) = D::requested_status(&input) {
            D::check_status_change(from, to)?;
        }
        let version = lock::next_version(current);

        let mut tx = self.repo.pool().begin().await?;
        D::write_fields(&mut tx, id, &input, version).await?;
        D::reconcile_children(&mut tx, id, input).await?;
        let document = D::load(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::not_found(D::KIND, id))?;
        tx.commit().await?;

        tracing::info!("Updated {}: {}", D::KIND, id);
        self.hooks
            .fire(ChangeEvent::new(D::KIND, id, ChangeAction::Updated));

        Ok(document)
    }

    /// Move a document to `status` without touching anything else.
    ///
    /// Not lock-checked: status flips come from contexts that never loaded
    /// the document. The move must be an allowed transition.
    pub async fn update_status(&self, id: &str, status: DocumentStatus) -> Result<D> {
        let (current, from) = self.repo.version_of(D::KIND, id).await?;

        if !from.can_transition_to(status) {
            return Err(AppError::validation(format!(
                "Cannot change {} status from {} to {}",
                D::KIND,
                from,
                status
            )));
        }
        D::check_status_change(from, status)?;

        self.repo
            .update_status(D::KIND, id, status, lock::next_version(current))
            .await?;

        tracing::info!("Changed {} {} status: {} -> {}", D::KIND, id, from, status);
        self.hooks
            .fire(ChangeEvent::new(D::KIND, id, ChangeAction::StatusChanged));

        self.load(id).await
    }

    /// Hide a document from every query
    pub async fn soft_delete(&self, id: &str) -> Result<()> {
        self.repo.soft_delete(D::KIND, id).await?;

        tracing::info!("Deleted {}: {}", D::KIND, id);
        self.hooks
            .fire(ChangeEvent::new(D::KIND, id, ChangeAction::Deleted));

        Ok(())
    }

    async fn load(&self, id: &str) -> Result<D> {
        let mut conn = self.repo.pool().acquire().await?;
        D::load(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::not_found(D::KIND, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        create_memory_pool, Erha, ExpenseDocument, InvoiceDocument, Paragon, PlanningDocument,
        QuotationDocument, TicketDocument,
    };
    use serde::de::DeserializeOwned;
    use serde_json::json;

    async fn service<D: Document>() -> DocumentService<D> {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        DocumentService::new(repo, Cache::disabled(), PostCommitHooks::new())
    }

    fn input<T: DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    async fn quotation_with_items(svc: &DocumentService<QuotationDocument>) -> QuotationDocument {
        svc.create(input(json!({
            "companyName": "Studio",
            "clientName": "Acme",
            "items": [
                {"productName": "A", "details": [{"description": "a1"}, {"description": "a2"}]},
                {"productName": "B"}
            ],
            "remarks": [{"text": "Deposit received"}]
        })))
        .await
        .unwrap()
    }

    fn item_ids(doc: &QuotationDocument) -> Vec<String> {
        doc.items.iter().filter_map(|i| i.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_create_quotation() {
        let svc = service::<QuotationDocument>().await;

        let doc = quotation_with_items(&svc).await;

        assert_eq!(doc.quotation.status, DocumentStatus::Draft);
        assert!(doc.quotation.quotation_number.starts_with("QTN-"));
        assert!(doc.quotation.quotation_number.ends_with("-0001"));
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].order, 0);
        assert_eq!(doc.items[1].order, 1);
        assert_eq!(doc.items[0].details.len(), 2);
        assert_eq!(doc.remarks[0].text, "Deposit received");
    }

    #[tokio::test]
    async fn test_create_requires_client() {
        let svc = service::<QuotationDocument>().await;

        let result = svc.create(input(json!({"companyName": "Studio"}))).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_partitions_items() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;
        let (a, b) = (item_ids(&doc)[0].clone(), item_ids(&doc)[1].clone());

        let updated = svc
            .update(
                &doc.quotation.id,
                input(json!({
                    "items": [{"id": b, "productName": "X"}, {"productName": "Y"}]
                })),
            )
            .await
            .unwrap();

        assert_eq!(updated.items.len(), 2);
        assert_eq!(updated.items[0].id.as_deref(), Some(b.as_str()));
        assert_eq!(updated.items[0].product_name, "X");
        assert_eq!(updated.items[0].order, 0);
        assert_eq!(updated.items[1].product_name, "Y");
        assert_eq!(updated.items[1].order, 1);
        assert!(!item_ids(&updated).contains(&a));
        // untouched collections survive
        assert_eq!(updated.remarks.len(), 1);
    }

    #[tokio::test]
    async fn test_resubmitting_snapshot_changes_nothing() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;

        let snapshot = serde_json::to_value(&doc).unwrap();
        let again = svc
            .update(&doc.quotation.id, input(snapshot))
            .await
            .unwrap();

        assert_eq!(again.items, doc.items);
        assert_eq!(again.remarks, doc.remarks);
        assert_eq!(again.signatures, doc.signatures);
        assert!(again.quotation.updated_at > doc.quotation.updated_at);
    }

    #[tokio::test]
    async fn test_empty_collection_clears_it() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;

        let updated = svc
            .update(&doc.quotation.id, input(json!({"items": [], "remarks": []})))
            .await
            .unwrap();

        assert!(updated.items.is_empty());
        assert!(updated.remarks.is_empty());
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected_without_changes() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;
        let stale = doc.quotation.updated_at;

        svc.update(&doc.quotation.id, input(json!({"notes": "first"})))
            .await
            .unwrap();
        let before = svc.get(&doc.quotation.id).await.unwrap();

        let result = svc
            .update(
                &doc.quotation.id,
                input(json!({"updatedAt": stale, "notes": "second", "items": []})),
            )
            .await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        let after = svc.get(&doc.quotation.id).await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_matching_version_is_accepted() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;

        let updated = svc
            .update(
                &doc.quotation.id,
                input(json!({"updatedAt": doc.quotation.updated_at, "eventName": "Gala"})),
            )
            .await
            .unwrap();

        assert_eq!(updated.quotation.event_name.as_deref(), Some("Gala"));
        assert!(updated.quotation.updated_at > doc.quotation.updated_at);
    }

    #[tokio::test]
    async fn test_explicit_null_clears_field() {
        let svc = service::<QuotationDocument>().await;
        let doc = svc
            .create(input(json!({
                "companyName": "Studio",
                "clientName": "Acme",
                "notes": "call back"
            })))
            .await
            .unwrap();

        let updated = svc
            .update(&doc.quotation.id, input(json!({"notes": null})))
            .await
            .unwrap();

        assert_eq!(updated.quotation.notes, None);
        assert_eq!(updated.quotation.client_name, "Acme");
    }

    #[tokio::test]
    async fn test_status_only_update_skips_lock() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;

        let pending = svc
            .update(&doc.quotation.id, input(json!({"status": "pending"})))
            .await
            .unwrap();
        assert_eq!(pending.quotation.status, DocumentStatus::Pending);
        assert_eq!(pending.items, doc.items);

        let reopened = svc
            .update(&doc.quotation.id, input(json!({"status": "draft"})))
            .await
            .unwrap();
        assert_eq!(reopened.quotation.status, DocumentStatus::Draft);

        let skip = svc
            .update(&doc.quotation.id, input(json!({"status": "finalized"})))
            .await;
        assert!(matches!(skip, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_forced_failure_rolls_back_everything() {
        let svc = service::<QuotationDocument>().await;
        let doc = quotation_with_items(&svc).await;

        sqlx::query(
            r#"
            CREATE TRIGGER fail_on_boom BEFORE INSERT ON quotation_item_details
            WHEN NEW.description = 'boom'
            BEGIN SELECT RAISE(ABORT, 'forced failure'); END
            "#,
        )
        .execute(svc.repo.pool())
        .await
        .unwrap();

        let result = svc
            .update(
                &doc.quotation.id,
                input(json!({
                    "clientName": "Changed",
                    "remarks": [],
                    "items": [
                        {"productName": "New"},
                        {"productName": "Last", "details": [{"description": "boom"}]}
                    ]
                })),
            )
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        let after = svc.get(&doc.quotation.id).await.unwrap();
        assert_eq!(after, doc);
    }

    #[tokio::test]
    async fn test_foreign_item_id_becomes_new_row() {
        let svc = service::<QuotationDocument>().await;
        let first = quotation_with_items(&svc).await;
        let second = quotation_with_items(&svc).await;
        let foreign = item_ids(&first)[0].clone();

        let updated = svc
            .update(
                &second.quotation.id,
                input(json!({"items": [{"id": foreign, "productName": "Hijack"}]})),
            )
            .await
            .unwrap();

        assert_eq!(updated.items.len(), 1);
        assert_ne!(updated.items[0].id.as_deref(), Some(foreign.as_str()));
        let untouched = svc.get(&first.quotation.id).await.unwrap();
        assert_eq!(untouched.items, first.items);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let svc = service::<InvoiceDocument>().await;

        let result = svc.update("nope", input(json!({"notes": "x"}))).await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));

        let result = svc.get("nope").await;
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_document() {
        let svc = service::<ExpenseDocument>().await;
        let doc = svc
            .create(input(json!({
                "description": "Truck rental",
                "expenseDate": "2026-04-02",
                "items": [{"description": "Day rate", "unitPrice": 150, "amount": 150}]
            })))
            .await
            .unwrap();
        assert_eq!(doc.expense.expense_number, "EXP-2026-0001");

        svc.soft_delete(&doc.expense.id).await.unwrap();

        assert!(svc.get(&doc.expense.id).await.is_err());
        assert_eq!(svc.list(ListFilter::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_invoice_number_follows_invoice_date() {
        let svc = service::<InvoiceDocument>().await;

        let doc = svc
            .create(input(json!({
                "companyName": "Studio",
                "clientName": "Acme",
                "invoiceDate": "2025-12-30",
                "dueDate": "2026-01-30"
            })))
            .await
            .unwrap();

        assert_eq!(doc.invoice.invoice_number, "INV-2025-0001");
    }

    #[tokio::test]
    async fn test_due_date_before_invoice_date_is_rejected() {
        let svc = service::<InvoiceDocument>().await;

        let result = svc
            .create(input(json!({
                "companyName": "Studio",
                "clientName": "Acme",
                "invoiceDate": "2026-02-10",
                "dueDate": "2026-02-01"
            })))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tickets_share_the_quotation_pool() {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let quotations: DocumentService<QuotationDocument> =
            DocumentService::new(repo.clone(), Cache::disabled(), PostCommitHooks::new());
        let paragon: DocumentService<TicketDocument<Paragon>> =
            DocumentService::new(repo.clone(), Cache::disabled(), PostCommitHooks::new());
        let erha: DocumentService<TicketDocument<Erha>> =
            DocumentService::new(repo, Cache::disabled(), PostCommitHooks::new());

        let q = quotations
            .create(input(json!({"companyName": "Studio", "clientName": "Acme"})))
            .await
            .unwrap();
        let p = paragon
            .create(input(json!({"clientName": "Paragon", "items": [{"productName": "LED"}]})))
            .await
            .unwrap();
        let e = erha
            .create(input(json!({"clientName": "Erha"})))
            .await
            .unwrap();

        let numbers = [
            q.quotation.quotation_number,
            p.ticket.quotation_number,
            e.ticket.quotation_number,
        ];
        assert!(numbers[0].ends_with("-0001"));
        assert!(numbers[1].ends_with("-0002"));
        assert!(numbers[2].ends_with("-0003"));
        assert_eq!(p.items.len(), 1);
        assert_eq!(p.ticket.invoice_number, None);
    }

    #[tokio::test]
    async fn test_ticket_status_change_cannot_finalize() {
        let svc = service::<TicketDocument<Paragon>>().await;
        let ticket = svc
            .create(input(json!({"clientName": "Paragon"})))
            .await
            .unwrap();
        svc.update_status(&ticket.ticket.id, DocumentStatus::Pending)
            .await
            .unwrap();

        let result = svc
            .update_status(&ticket.ticket.id, DocumentStatus::Finalized)
            .await;

        assert!(matches!(result, Err(AppError::Validation(ref m)) if m.contains("finalize_paragon_ticket")));
        let after = svc.get(&ticket.ticket.id).await.unwrap();
        assert_eq!(after.ticket.status, DocumentStatus::Pending);
        assert_eq!(after.ticket.invoice_number, None);
    }

    #[tokio::test]
    async fn test_ticket_full_update_cannot_finalize() {
        let svc = service::<TicketDocument<Erha>>().await;
        let ticket = svc
            .create(input(json!({"clientName": "Erha"})))
            .await
            .unwrap();

        let result = svc
            .update(
                &ticket.ticket.id,
                input(json!({"status": "finalized", "notes": "ship it"})),
            )
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let after = svc.get(&ticket.ticket.id).await.unwrap();
        assert_eq!(after.ticket.status, DocumentStatus::Draft);
        assert_eq!(after.ticket.notes, None);
        assert_eq!(after.ticket.invoice_number, None);

        // other status moves still go through a full update
        let pending = svc
            .update(&ticket.ticket.id, input(json!({"status": "pending", "notes": "ready"})))
            .await
            .unwrap();
        assert_eq!(pending.ticket.status, DocumentStatus::Pending);
    }

    #[tokio::test]
    async fn test_due_date_is_checked_against_stored_invoice_date() {
        let svc = service::<InvoiceDocument>().await;
        let doc = svc
            .create(input(json!({
                "companyName": "Studio",
                "clientName": "Acme",
                "invoiceDate": "2026-02-10"
            })))
            .await
            .unwrap();

        let result = svc
            .update(&doc.invoice.id, input(json!({"dueDate": "2026-02-01"})))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let after = svc.get(&doc.invoice.id).await.unwrap();
        assert_eq!(after, doc);

        let later = svc
            .update(&doc.invoice.id, input(json!({"dueDate": "2026-03-10"})))
            .await
            .unwrap();
        assert!(later.invoice.due_date.is_some());
    }

    #[tokio::test]
    async fn test_planning_end_is_checked_against_stored_start() {
        let svc = service::<PlanningDocument>().await;
        let doc = svc
            .create(input(json!({"title": "Launch event", "startDate": "2026-05-01"})))
            .await
            .unwrap();

        let result = svc
            .update(&doc.planning.id, input(json!({"endDate": "2026-04-30"})))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(svc.get(&doc.planning.id).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn test_planning_items_reorder() {
        let svc = service::<PlanningDocument>().await;
        let doc = svc
            .create(input(json!({
                "title": "Launch event",
                "startDate": "2026-05-01",
                "endDate": "2026-05-03",
                "items": [{"activity": "Load in"}, {"activity": "Show"}, {"activity": "Load out"}]
            })))
            .await
            .unwrap();

        let mut reversed = doc.items.clone();
        reversed.reverse();
        let updated = svc
            .update(&doc.planning.id, input(json!({"items": reversed})))
            .await
            .unwrap();

        let activities: Vec<&str> = updated.items.iter().map(|i| i.activity.as_str()).collect();
        assert_eq!(activities, vec!["Load out", "Show", "Load in"]);
        assert_eq!(updated.items[0].id, doc.items[2].id);
        assert_eq!(updated.items[2].order, 2);
    }

    #[tokio::test]
    async fn test_planning_end_before_start_is_rejected() {
        let svc = service::<PlanningDocument>().await;

        let result = svc
            .create(input(json!({
                "title": "Launch event",
                "startDate": "2026-05-03",
                "endDate": "2026-05-01"
            })))
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_get_reads_through_cache() {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let cache = Cache::memory();
        let svc: DocumentService<QuotationDocument> =
            DocumentService::new(repo, cache.clone(), PostCommitHooks::new());
        let doc = quotation_with_items(&svc).await;

        let fetched = svc.get(&doc.quotation.id).await.unwrap();

        let cached: Option<QuotationDocument> = cache
            .get_json(&keys::document(crate::database::EntityKind::Quotation, &doc.quotation.id))
            .await;
        assert_eq!(cached, Some(fetched));
    }
}
