//! Transactional reconciler
//!
//! Makes the persisted child rows of one parent match an incoming snapshot.
//! Every incoming row is stamped with its array position as `sort_order`,
//! rows whose id belongs to this parent are updated, all others are
//! inserted, and persisted rows missing from the snapshot are deleted.
//!
//! Detail rows (the second nesting level) are never diffed: the details of an
//! updated row are deleted and inserted again in full.
//!
//! All functions take the caller's connection, which is expected to be the
//! connection of an open transaction. Nothing here commits or rolls back.

use crate::error::Result;
use sqlx::query_builder::Separated;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Row, Sqlite, SqliteConnection};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use uuid::Uuid;

/// A row stored in an ordered child table
///
/// `COLUMNS` lists the business columns in the order `push_values` binds
/// them. `id`, the parent key and `sort_order` are handled by the reconciler.
pub trait OrderedRow: Send + Sync + Unpin + for<'r> FromRow<'r, SqliteRow> {
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: Option<String>);
    fn order(&self) -> i64;
    fn set_order(&mut self, order: i64);
    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>);
}

/// A directly reconciled child row, optionally owning detail rows
pub trait ChildRow: OrderedRow {
    type Detail: OrderedRow;

    fn details(&self) -> &[Self::Detail] {
        &[]
    }

    fn set_details(&mut self, _details: Vec<Self::Detail>) {}
}

/// Detail type of collections whose rows own no detail rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDetail;

impl<'r> FromRow<'r, SqliteRow> for NoDetail {
    fn from_row(_row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(NoDetail)
    }
}

impl OrderedRow for NoDetail {
    const COLUMNS: &'static [&'static str] = &[];

    fn id(&self) -> Option<&str> {
        None
    }

    fn set_id(&mut self, _id: Option<String>) {}

    fn order(&self) -> i64 {
        0
    }

    fn set_order(&mut self, _order: i64) {}

    fn push_values<'args>(&self, _values: &mut Separated<'_, 'args, Sqlite, &'static str>) {}
}

/// A child table and the column pointing at its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub parent_key: &'static str,
}

impl Table {
    pub const fn new(name: &'static str, parent_key: &'static str) -> Self {
        Self { name, parent_key }
    }
}

/// What a single collection reconciliation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub updated: usize,
    pub created: usize,
    pub removed: u64,
}

/// One ordered child collection of a document
pub struct Collection<C> {
    name: &'static str,
    table: Table,
    details: Option<Table>,
    rows: PhantomData<fn() -> C>,
}

impl<C> Collection<C> {
    /// Collection whose rows own no detail rows
    pub const fn flat(name: &'static str, table: Table) -> Self {
        Self {
            name,
            table,
            details: None,
            rows: PhantomData,
        }
    }

    /// Collection whose rows own a detail table
    pub const fn nested(name: &'static str, table: Table, details: Table) -> Self {
        Self {
            name,
            table,
            details: Some(details),
            rows: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn table(&self) -> Table {
        self.table
    }
}

impl<C: ChildRow> Collection<C> {
    /// Reconcile the rows of `parent_id` against `incoming`.
    ///
    /// An empty `incoming` removes every row of this collection.
    pub async fn reconcile(
        &self,
        conn: &mut SqliteConnection,
        parent_id: &str,
        mut incoming: Vec<C>,
    ) -> Result<ReconcileSummary> {
        let persisted = self.persisted_ids(conn, parent_id).await?;

        for (position, row) in incoming.iter_mut().enumerate() {
            row.set_order(position as i64);
        }

        // Ids owned by another parent (or unknown) fall into the create set,
        // as does a repeated id after its first occurrence
        let mut claimed = HashSet::new();
        let (updates, creates): (Vec<C>, Vec<C>) = incoming.into_iter().partition(|row| {
            row.id()
                .is_some_and(|id| persisted.contains(id) && claimed.insert(id.to_string()))
        });

        let mut kept = Vec::with_capacity(updates.len() + creates.len());

        for row in &updates {
            let Some(id) = row.id() else { continue };
            update_row(conn, self.table, parent_id, id, row).await?;
            kept.push(id.to_string());
        }

        if let Some(details) = self.details {
            replace_details(conn, details, &updates).await?;
        }

        for row in &creates {
            let id = insert_row(conn, self.table, parent_id, row.id(), row.order(), row).await?;
            if let Some(details) = self.details {
                insert_details(conn, details, &id, row.details()).await?;
            }
            kept.push(id);
        }

        let removed = delete_except(conn, self.table, parent_id, &kept).await?;

        let summary = ReconcileSummary {
            updated: updates.len(),
            created: creates.len(),
            removed,
        };

        tracing::debug!(
            "Reconciled {} of {}: {} updated, {} created, {} removed",
            self.name,
            parent_id,
            summary.updated,
            summary.created,
            summary.removed
        );

        Ok(summary)
    }

    /// Load the rows of `parent_id` ordered by `sort_order`, with details
    pub async fn load(&self, conn: &mut SqliteConnection, parent_id: &str) -> Result<Vec<C>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ? ORDER BY sort_order ASC",
            self.table.name, self.table.parent_key
        );

        let mut rows = sqlx::query_as::<_, C>(&sql)
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?;

        let Some(details) = self.details else {
            return Ok(rows);
        };

        let parent_ids: Vec<String> = rows
            .iter()
            .filter_map(|row| row.id().map(str::to_string))
            .collect();

        let mut grouped = load_details::<C::Detail>(conn, details, parent_ids).await?;

        for row in rows.iter_mut() {
            let owned = row
                .id()
                .and_then(|id| grouped.remove(id))
                .unwrap_or_default();
            row.set_details(owned);
        }

        Ok(rows)
    }

    async fn persisted_ids(
        &self,
        conn: &mut SqliteConnection,
        parent_id: &str,
    ) -> Result<HashSet<String>> {
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?",
            self.table.name, self.table.parent_key
        );

        let ids: Vec<String> = sqlx::query_scalar(&sql)
            .bind(parent_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(ids.into_iter().collect())
    }
}

/// Strip ids from rows and their details so they insert as new rows elsewhere
pub fn detached<C: ChildRow>(rows: Vec<C>) -> Vec<C>
where
    C::Detail: Clone,
{
    rows.into_iter()
        .map(|mut row| {
            row.set_id(None);
            let details = row
                .details()
                .iter()
                .cloned()
                .map(|mut detail| {
                    detail.set_id(None);
                    detail
                })
                .collect();
            row.set_details(details);
            row
        })
        .collect()
}

/// Pick the id for a row about to be inserted.
///
/// A client-supplied id is kept while no row of the table uses it, so ids
/// generated before the first save survive. Anything else gets a fresh UUID.
async fn claim_id(
    conn: &mut SqliteConnection,
    table: &str,
    requested: Option<&str>,
) -> Result<String> {
    if let Some(id) = requested.filter(|id| !id.trim().is_empty()) {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", table);
        let taken: i64 = sqlx::query_scalar(&sql)
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        if taken == 0 {
            return Ok(id.to_string());
        }

        tracing::debug!("Id {} already used in {}, assigning a new one", id, table);
    }

    Ok(Uuid::new_v4().to_string())
}

async fn insert_row<R: OrderedRow>(
    conn: &mut SqliteConnection,
    table: Table,
    parent_id: &str,
    requested_id: Option<&str>,
    order: i64,
    row: &R,
) -> Result<String> {
    let id = claim_id(conn, table.name, requested_id).await?;

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "INSERT INTO {} (id, {}, sort_order",
        table.name, table.parent_key
    ));
    for column in R::COLUMNS {
        builder.push(", ").push(*column);
    }
    builder.push(") VALUES (");

    let mut values = builder.separated(", ");
    values.push_bind(id.clone());
    values.push_bind(parent_id.to_string());
    values.push_bind(order);
    row.push_values(&mut values);
    values.push_unseparated(")");

    builder.build().execute(&mut *conn).await?;

    Ok(id)
}

async fn update_row<R: OrderedRow>(
    conn: &mut SqliteConnection,
    table: Table,
    parent_id: &str,
    id: &str,
    row: &R,
) -> Result<()> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!("UPDATE {} SET (sort_order", table.name));
    for column in R::COLUMNS {
        builder.push(", ").push(*column);
    }
    builder.push(") = (");

    let mut values = builder.separated(", ");
    values.push_bind(row.order());
    row.push_values(&mut values);
    values.push_unseparated(") WHERE id = ");
    values.push_bind_unseparated(id.to_string());
    values.push_unseparated(format!(" AND {} = ", table.parent_key));
    values.push_bind_unseparated(parent_id.to_string());

    builder.build().execute(&mut *conn).await?;

    Ok(())
}

/// Delete every detail of the updated rows, then insert the incoming ones
async fn replace_details<C: ChildRow>(
    conn: &mut SqliteConnection,
    details: Table,
    updated: &[C],
) -> Result<()> {
    let owners: Vec<&str> = updated.iter().filter_map(|row| row.id()).collect();
    if owners.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "DELETE FROM {} WHERE {} IN (",
        details.name, details.parent_key
    ));
    let mut ids = builder.separated(", ");
    for owner in &owners {
        ids.push_bind(owner.to_string());
    }
    ids.push_unseparated(")");

    builder.build().execute(&mut *conn).await?;

    for row in updated {
        if let Some(owner) = row.id() {
            insert_details(conn, details, owner, row.details()).await?;
        }
    }

    Ok(())
}

async fn insert_details<D: OrderedRow>(
    conn: &mut SqliteConnection,
    details: Table,
    owner_id: &str,
    rows: &[D],
) -> Result<()> {
    for (position, detail) in rows.iter().enumerate() {
        insert_row(conn, details, owner_id, detail.id(), position as i64, detail).await?;
    }
    Ok(())
}

async fn load_details<D: OrderedRow>(
    conn: &mut SqliteConnection,
    details: Table,
    owner_ids: Vec<String>,
) -> Result<HashMap<String, Vec<D>>> {
    let mut grouped: HashMap<String, Vec<D>> = HashMap::new();
    if owner_ids.is_empty() {
        return Ok(grouped);
    }

    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "SELECT * FROM {} WHERE {} IN (",
        details.name, details.parent_key
    ));
    let mut ids = builder.separated(", ");
    for owner in owner_ids {
        ids.push_bind(owner);
    }
    ids.push_unseparated(") ORDER BY sort_order ASC");

    let rows = builder.build().fetch_all(&mut *conn).await?;

    for row in &rows {
        let owner: String = row.try_get(details.parent_key)?;
        grouped.entry(owner).or_default().push(D::from_row(row)?);
    }

    Ok(grouped)
}

/// Delete the parent's rows whose id is not in `kept`
async fn delete_except(
    conn: &mut SqliteConnection,
    table: Table,
    parent_id: &str,
    kept: &[String],
) -> Result<u64> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        "DELETE FROM {} WHERE {} = ",
        table.name, table.parent_key
    ));
    builder.push_bind(parent_id.to_string());

    if !kept.is_empty() {
        builder.push(" AND id NOT IN (");
        let mut ids = builder.separated(", ");
        for id in kept {
            ids.push_bind(id.clone());
        }
        ids.push_unseparated(")");
    }

    let removed = builder.build().execute(&mut *conn).await?.rows_affected();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{ItemDetail, LineItem, Remark};
    use crate::database::create_memory_pool;
    use chrono::Utc;
    use sqlx::SqlitePool;

    const ITEMS: Collection<LineItem> = Collection::nested(
        "items",
        Table::new("quotation_items", "quotation_id"),
        Table::new("quotation_item_details", "item_id"),
    );

    const REMARKS: Collection<Remark> =
        Collection::flat("remarks", Table::new("quotation_remarks", "quotation_id"));

    async fn insert_quotation(pool: &SqlitePool, id: &str) {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO quotations (id, quotation_number, company_name, client_name, created_at, updated_at)
            VALUES (?, ?, 'Studio', 'Client', ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("QTN-2026-{}", id))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    fn item(id: Option<&str>, name: &str) -> LineItem {
        LineItem {
            id: id.map(str::to_string),
            product_name: name.to_string(),
            quantity: 1.0,
            ..Default::default()
        }
    }

    fn detail(id: Option<&str>, description: &str) -> ItemDetail {
        ItemDetail {
            id: id.map(str::to_string),
            description: description.to_string(),
            quantity: 1.0,
            ..Default::default()
        }
    }

    async fn setup() -> SqlitePool {
        let pool = create_memory_pool().await.unwrap();
        insert_quotation(&pool, "q1").await;
        insert_quotation(&pool, "q2").await;
        pool
    }

    async fn reconcile_items(pool: &SqlitePool, parent: &str, rows: Vec<LineItem>) -> Vec<LineItem> {
        let mut conn = pool.acquire().await.unwrap();
        ITEMS.reconcile(&mut conn, parent, rows).await.unwrap();
        ITEMS.load(&mut conn, parent).await.unwrap()
    }

    #[tokio::test]
    async fn test_creates_rows_in_array_order() {
        let pool = setup().await;

        let loaded = reconcile_items(
            &pool,
            "q1",
            vec![item(None, "Stage"), item(None, "Lighting"), item(None, "Sound")],
        )
        .await;

        let names: Vec<&str> = loaded.iter().map(|i| i.product_name.as_str()).collect();
        assert_eq!(names, vec!["Stage", "Lighting", "Sound"]);
        let orders: Vec<i64> = loaded.iter().map(|i| i.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert!(loaded.iter().all(|i| i.id.is_some()));
    }

    #[tokio::test]
    async fn test_update_create_delete_scenario() {
        let pool = setup().await;

        let first = reconcile_items(&pool, "q1", vec![item(Some("a"), "A"), item(Some("b"), "B")]).await;
        assert_eq!(first.len(), 2);

        let second = reconcile_items(&pool, "q1", vec![item(Some("b"), "X"), item(None, "Y")]).await;

        assert_eq!(second.len(), 2);
        assert_eq!(second[0].id.as_deref(), Some("b"));
        assert_eq!(second[0].product_name, "X");
        assert_eq!(second[0].order, 0);
        assert_ne!(second[1].id.as_deref(), Some("a"));
        assert_eq!(second[1].product_name, "Y");
        assert_eq!(second[1].order, 1);

        let a_left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quotation_items WHERE id = 'a'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(a_left, 0);
    }

    #[tokio::test]
    async fn test_reconciling_returned_snapshot_is_a_no_op() {
        let pool = setup().await;

        let mut stage = item(None, "Stage");
        stage.details = vec![detail(None, "Truss"), detail(None, "Deck")];
        let first = reconcile_items(&pool, "q1", vec![stage, item(None, "Sound")]).await;

        let second = reconcile_items(&pool, "q1", first.clone()).await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_snapshot_clears_collection() {
        let pool = setup().await;

        let mut stage = item(None, "Stage");
        stage.details = vec![detail(None, "Truss")];
        reconcile_items(&pool, "q1", vec![stage, item(None, "Sound")]).await;

        let loaded = reconcile_items(&pool, "q1", Vec::new()).await;
        assert!(loaded.is_empty());

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quotation_item_details")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_details_of_updated_rows_are_replaced() {
        let pool = setup().await;

        let mut stage = item(Some("stage"), "Stage");
        stage.details = vec![detail(Some("d1"), "Truss"), detail(Some("d2"), "Deck")];
        reconcile_items(&pool, "q1", vec![stage]).await;

        let mut stage = item(Some("stage"), "Stage");
        stage.details = vec![detail(Some("d2"), "Deck 2x1"), detail(None, "Skirt")];
        let loaded = reconcile_items(&pool, "q1", vec![stage]).await;

        let details = &loaded[0].details;
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].id.as_deref(), Some("d2"));
        assert_eq!(details[0].description, "Deck 2x1");
        assert_eq!(details[1].description, "Skirt");

        let d1_left: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM quotation_item_details WHERE id = 'd1'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(d1_left, 0);
    }

    #[tokio::test]
    async fn test_foreign_ids_become_new_rows() {
        let pool = setup().await;

        reconcile_items(&pool, "q2", vec![item(Some("shared"), "Other parent")]).await;

        let loaded = reconcile_items(&pool, "q1", vec![item(Some("shared"), "Mine")]).await;

        assert_eq!(loaded.len(), 1);
        assert_ne!(loaded[0].id.as_deref(), Some("shared"));

        let mut conn = pool.acquire().await.unwrap();
        let other = ITEMS.load(&mut conn, "q2").await.unwrap();
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].product_name, "Other parent");
    }

    #[tokio::test]
    async fn test_unused_client_ids_are_kept() {
        let pool = setup().await;

        let loaded = reconcile_items(&pool, "q1", vec![item(Some("local-1"), "Stage")]).await;

        assert_eq!(loaded[0].id.as_deref(), Some("local-1"));
    }

    #[tokio::test]
    async fn test_flat_collection_reorders() {
        let pool = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let remark = |id: &str, text: &str| Remark {
            id: Some(id.to_string()),
            text: text.to_string(),
            ..Default::default()
        };

        REMARKS
            .reconcile(&mut conn, "q1", vec![remark("r1", "Deposit"), remark("r2", "Crew meals")])
            .await
            .unwrap();

        let summary = REMARKS
            .reconcile(&mut conn, "q1", vec![remark("r2", "Crew meals"), remark("r1", "Deposit")])
            .await
            .unwrap();

        assert_eq!(
            summary,
            ReconcileSummary {
                updated: 2,
                created: 0,
                removed: 0
            }
        );

        let loaded = REMARKS.load(&mut conn, "q1").await.unwrap();
        let ids: Vec<&str> = loaded.iter().filter_map(|r| r.id.as_deref()).collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[tokio::test]
    async fn test_rollback_leaves_rows_untouched() {
        let pool = setup().await;
        reconcile_items(&pool, "q1", vec![item(Some("a"), "A"), item(Some("b"), "B")]).await;

        {
            let mut tx = pool.begin().await.unwrap();
            ITEMS
                .reconcile(&mut tx, "q1", vec![item(None, "Only")])
                .await
                .unwrap();
            // dropped without commit
        }

        let mut conn = pool.acquire().await.unwrap();
        let loaded = ITEMS.load(&mut conn, "q1").await.unwrap();
        let ids: Vec<&str> = loaded.iter().filter_map(|i| i.id.as_deref()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_repeated_id_is_only_updated_once() {
        let pool = setup().await;
        reconcile_items(&pool, "q1", vec![item(Some("a"), "A")]).await;

        let loaded = reconcile_items(&pool, "q1", vec![item(Some("a"), "A1"), item(Some("a"), "A2")]).await;

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id.as_deref(), Some("a"));
        assert_eq!(loaded[0].product_name, "A1");
        assert_eq!(loaded[1].product_name, "A2");
        assert_eq!(loaded[1].order, 1);
    }

    #[tokio::test]
    async fn test_detached_rows_lose_ids() {
        let mut stage = item(Some("a"), "Stage");
        stage.details = vec![detail(Some("d"), "Truss")];

        let rows = detached(vec![stage]);

        assert!(rows[0].id.is_none());
        assert!(rows[0].details[0].id.is_none());
        assert_eq!(rows[0].details[0].description, "Truss");
    }
}
