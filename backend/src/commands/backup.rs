//! Backup-related commands
//!
//! Commands for creating, listing and verifying backups.

use crate::app::AppState;
use crate::database::Backup;
use crate::error::{AppError, Result};
use crate::services::backup::BackupManifest;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBackupArgs {
    pub backup_path: String,
}

/// Snapshot the database into a new archive
pub async fn create_backup(state: &AppState) -> Result<Backup> {
    state.backup.create_backup().await
}

/// List all available backups
pub async fn list_backups(state: &AppState) -> Result<Vec<Backup>> {
    state.backup.list_backups().await
}

/// Check an archive against its manifest
///
/// Only archives inside the backups directory are accepted.
pub async fn verify_backup(state: &AppState, args: VerifyBackupArgs) -> Result<BackupManifest> {
    let backup_dir = state.config.backup_dir();

    // Canonicalize paths for proper comparison (resolves symlinks, .., etc.)
    let canonical_backup_dir = backup_dir
        .canonicalize()
        .map_err(|e| AppError::Backup(format!("Failed to resolve backup directory: {}", e)))?;

    let canonical_path = Path::new(&args.backup_path)
        .canonicalize()
        .map_err(|_| AppError::validation("Invalid backup path"))?;

    if !canonical_path.starts_with(&canonical_backup_dir) {
        tracing::warn!(
            "Path traversal attempt blocked: {} is outside {}",
            args.backup_path,
            backup_dir.display()
        );
        return Err(AppError::validation(
            "Invalid backup path: must be within the backups directory",
        ));
    }

    state.backup.verify_backup(&canonical_path).await
}
