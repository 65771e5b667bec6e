//! Commands exposed to clients
//!
//! This module organizes commands into logical submodules:
//! - `documents`: CRUD and status operations for every document kind
//! - `lineage`: invoice generation, ticket finalization, cleanup tooling
//! - `reports`: dashboard, calendar feed, exports, activity log
//! - `backup`: backup operations
//!
//! Every command takes `&AppState` and typed arguments. [`dispatch`] routes a
//! named command with JSON arguments to its handler; [`handle_line`] wraps it
//! for the newline-delimited JSON transport used by the binary.

pub mod backup;
pub mod documents;
pub mod lineage;
pub mod reports;

use crate::app::AppState;
use crate::error::{AppError, ErrorResponse, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use backup::*;
pub use documents::*;
pub use lineage::*;
pub use reports::*;

// ===== General Commands =====

/// Application information structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub version: String,
    pub data_dir: String,
    pub cache_backend: String,
}

/// Get application information
pub async fn get_app_info(state: &AppState) -> Result<AppInfo> {
    Ok(AppInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        data_dir: state.config.data_dir.to_string_lossy().to_string(),
        cache_backend: state.cache.backend_name().to_string(),
    })
}

// ===== Transport =====

/// One request line
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

/// One response line; exactly one of `result` and `error` is set
#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

impl Response {
    fn from_outcome(id: Value, outcome: std::result::Result<Value, ErrorResponse>) -> Self {
        match outcome {
            Ok(result) => Self {
                id,
                ok: true,
                result: Some(result),
                error: None,
            },
            Err(error) => Self {
                id,
                ok: false,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// Handle one request line and produce one response line (without newline)
pub async fn handle_line(state: &AppState, line: &str) -> String {
    let response = match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            let outcome = dispatch(state, &request.command, request.args).await;
            Response::from_outcome(request.id, outcome)
        }
        Err(e) => Response::from_outcome(
            Value::Null,
            Err(AppError::validation(format!("Malformed request: {}", e)).to_response()),
        ),
    };

    serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!("Failed to encode response: {}", e);
        r#"{"id":null,"ok":false,"error":{"code":"INTERNAL_ERROR","message":"Internal server error","status":500}}"#
            .to_string()
    })
}

/// Route a named command to its handler
pub async fn dispatch(
    state: &AppState,
    command: &str,
    args: Value,
) -> std::result::Result<Value, ErrorResponse> {
    tracing::debug!("Command: {}", command);

    route(state, command, args).await.map_err(|e| {
        if !matches!(e, AppError::Validation(_) | AppError::NotFound { .. }) {
            tracing::warn!("Command {} failed: {}", command, e);
        }
        e.to_response()
    })
}

async fn route(state: &AppState, command: &str, args: Value) -> Result<Value> {
    match command {
        "get_app_info" => respond(get_app_info(state).await),

        "create_quotation" => respond(create_quotation(state, parse(args)?).await),
        "get_quotation" => respond(get_quotation(state, parse(args)?).await),
        "list_quotations" => respond(list_quotations(state, parse(args)?).await),
        "update_quotation" => respond(update_quotation(state, parse(args)?).await),
        "update_quotation_status" => respond(update_quotation_status(state, parse(args)?).await),
        "delete_quotation" => respond(delete_quotation(state, parse(args)?).await),

        "create_invoice" => respond(create_invoice(state, parse(args)?).await),
        "get_invoice" => respond(get_invoice(state, parse(args)?).await),
        "list_invoices" => respond(list_invoices(state, parse(args)?).await),
        "update_invoice" => respond(update_invoice(state, parse(args)?).await),
        "update_invoice_status" => respond(update_invoice_status(state, parse(args)?).await),
        "delete_invoice" => respond(delete_invoice(state, parse(args)?).await),

        "create_paragon_ticket" => respond(create_paragon_ticket(state, parse(args)?).await),
        "get_paragon_ticket" => respond(get_paragon_ticket(state, parse(args)?).await),
        "list_paragon_tickets" => respond(list_paragon_tickets(state, parse(args)?).await),
        "update_paragon_ticket" => respond(update_paragon_ticket(state, parse(args)?).await),
        "update_paragon_ticket_status" => {
            respond(update_paragon_ticket_status(state, parse(args)?).await)
        }
        "delete_paragon_ticket" => respond(delete_paragon_ticket(state, parse(args)?).await),
        "finalize_paragon_ticket" => respond(finalize_paragon_ticket(state, parse(args)?).await),

        "create_erha_ticket" => respond(create_erha_ticket(state, parse(args)?).await),
        "get_erha_ticket" => respond(get_erha_ticket(state, parse(args)?).await),
        "list_erha_tickets" => respond(list_erha_tickets(state, parse(args)?).await),
        "update_erha_ticket" => respond(update_erha_ticket(state, parse(args)?).await),
        "update_erha_ticket_status" => {
            respond(update_erha_ticket_status(state, parse(args)?).await)
        }
        "delete_erha_ticket" => respond(delete_erha_ticket(state, parse(args)?).await),
        "finalize_erha_ticket" => respond(finalize_erha_ticket(state, parse(args)?).await),

        "create_planning" => respond(create_planning(state, parse(args)?).await),
        "get_planning" => respond(get_planning(state, parse(args)?).await),
        "list_plannings" => respond(list_plannings(state, parse(args)?).await),
        "update_planning" => respond(update_planning(state, parse(args)?).await),
        "update_planning_status" => respond(update_planning_status(state, parse(args)?).await),
        "delete_planning" => respond(delete_planning(state, parse(args)?).await),

        "create_expense" => respond(create_expense(state, parse(args)?).await),
        "get_expense" => respond(get_expense(state, parse(args)?).await),
        "list_expenses" => respond(list_expenses(state, parse(args)?).await),
        "update_expense" => respond(update_expense(state, parse(args)?).await),
        "update_expense_status" => respond(update_expense_status(state, parse(args)?).await),
        "delete_expense" => respond(delete_expense(state, parse(args)?).await),

        "generate_invoice" => respond(generate_invoice(state, parse(args)?).await),
        "hard_delete" => respond(hard_delete(state, parse(args)?).await),
        "purge_deleted" => respond(purge_deleted(state, parse(args)?).await),

        "get_dashboard_summary" => respond(get_dashboard_summary(state).await),
        "get_calendar_feed" => respond(get_calendar_feed(state).await),
        "export_documents" => respond(export_documents(state, parse(args)?).await),
        "list_activity" => respond(list_activity(state, parse(args)?).await),

        "create_backup" => respond(create_backup(state).await),
        "list_backups" => respond(list_backups(state).await),
        "verify_backup" => respond(verify_backup(state, parse(args)?).await),

        other => Err(AppError::validation(format!("Unknown command: {}", other))),
    }
}

/// Decode command arguments; absent arguments read as an empty object
fn parse<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };

    serde_json::from_value(args).map_err(|e| AppError::validation(format!("Invalid arguments: {}", e)))
}

fn respond<T: Serialize>(result: Result<T>) -> Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn state() -> (AppState, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            export_schedule: None,
            backup_schedule: None,
            ..AppConfig::default()
        };
        (AppState::initialize(config).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn test_create_and_get_quotation() {
        let (state, _dir) = state().await;

        let created = dispatch(
            &state,
            "create_quotation",
            json!({"companyName": "Studio", "clientName": "Acme", "items": [{"productName": "Stage"}]}),
        )
        .await
        .unwrap();
        assert!(created["quotationNumber"].as_str().unwrap().starts_with("QTN-"));

        let fetched = dispatch(&state, "get_quotation", json!({"id": created["id"]}))
            .await
            .unwrap();
        assert_eq!(fetched["items"][0]["productName"], "Stage");
    }

    #[tokio::test]
    async fn test_stale_update_is_a_lock_conflict() {
        let (state, _dir) = state().await;

        let created = dispatch(
            &state,
            "create_quotation",
            json!({"companyName": "Studio", "clientName": "Acme"}),
        )
        .await
        .unwrap();

        let error = dispatch(
            &state,
            "update_quotation",
            json!({
                "id": created["id"],
                "input": {"clientName": "Other", "updatedAt": "2000-01-01T00:00:00Z"}
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(error.status, 409);
        assert_eq!(serde_json::to_value(&error).unwrap()["code"], "OPTIMISTIC_LOCK_ERROR");
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let (state, _dir) = state().await;

        let error = dispatch(&state, "get_invoice", json!({"id": "nope"}))
            .await
            .unwrap_err();

        assert_eq!(error.status, 404);
    }

    #[tokio::test]
    async fn test_unknown_command_and_bad_args() {
        let (state, _dir) = state().await;

        let unknown = dispatch(&state, "drop_tables", Value::Null).await.unwrap_err();
        assert_eq!(unknown.status, 400);

        let bad = dispatch(&state, "get_quotation", json!({"id": 7})).await.unwrap_err();
        assert_eq!(bad.status, 400);
    }

    #[tokio::test]
    async fn test_handle_line() {
        let (state, _dir) = state().await;

        let line = handle_line(&state, r#"{"id": 1, "command": "list_plannings"}"#).await;
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["ok"], true);
        assert_eq!(response["result"]["total"], 0);

        let line = handle_line(&state, "not json").await;
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["ok"], false);
        assert_eq!(response["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_verify_backup_rejects_outside_paths() {
        let (state, dir) = state().await;

        let outside = dir.path().join("bizdesk.db");
        let error = dispatch(
            &state,
            "verify_backup",
            json!({"backupPath": outside.to_string_lossy()}),
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, 400);

        let backup = dispatch(&state, "create_backup", Value::Null).await.unwrap();
        let manifest = dispatch(&state, "verify_backup", json!({"backupPath": backup["path"]}))
            .await
            .unwrap();
        assert_eq!(manifest["files"].as_array().unwrap().len(), 1);
    }
}
