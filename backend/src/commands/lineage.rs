//! Cross-document commands
//!
//! Invoice generation, ticket finalization and the cleanup tooling.

use crate::app::AppState;
use crate::commands::documents::IdArgs;
use crate::database::{EntityKind, Erha, InvoiceDocument, Paragon, TicketDocument};
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindArgs {
    pub kind: EntityKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindIdArgs {
    pub kind: EntityKind,
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeResult {
    pub kind: EntityKind,
    pub purged: usize,
}

/// Create an invoice from a quotation
pub async fn generate_invoice(state: &AppState, args: IdArgs) -> Result<InvoiceDocument> {
    state.lineage.generate_invoice(&args.id).await
}

pub async fn finalize_paragon_ticket(
    state: &AppState,
    args: IdArgs,
) -> Result<TicketDocument<Paragon>> {
    state.lineage.finalize_ticket::<Paragon>(&args.id).await
}

pub async fn finalize_erha_ticket(state: &AppState, args: IdArgs) -> Result<TicketDocument<Erha>> {
    state.lineage.finalize_ticket::<Erha>(&args.id).await
}

/// Permanently delete one document
pub async fn hard_delete(state: &AppState, args: KindIdArgs) -> Result<()> {
    tracing::info!("Hard delete requested for {} {}", args.kind, args.id);
    state.lineage.hard_delete(args.kind, &args.id).await
}

/// Permanently delete every soft-deleted document of a kind
pub async fn purge_deleted(state: &AppState, args: KindArgs) -> Result<PurgeResult> {
    let purged = state.lineage.purge_deleted(args.kind).await?;
    Ok(PurgeResult {
        kind: args.kind,
        purged,
    })
}
