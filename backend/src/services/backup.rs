//! Backup service
//!
//! Creates consistent snapshots of the database with `VACUUM INTO` and
//! packages them as ZIP files with a manifest and checksums.

use crate::database::{Backup, Repository};
use crate::error::{AppError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use zip::write::FileOptions;
use zip::ZipWriter;

const SNAPSHOT_ENTRY: &str = "bizdesk.db";
const MANIFEST_ENTRY: &str = "manifest.json";

/// Backup manifest structure
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupManifest {
    pub version: String,
    pub timestamp: String,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub checksum: String,
}

/// Backup service
#[derive(Clone)]
pub struct BackupService {
    repo: Repository,
    backups_dir: PathBuf,
    retention: usize,
}

impl BackupService {
    pub fn new(repo: Repository, backups_dir: PathBuf, retention: usize) -> Self {
        Self {
            repo,
            backups_dir,
            retention: retention.max(1),
        }
    }

    /// Snapshot the database into a new archive and apply retention
    pub async fn create_backup(&self) -> Result<Backup> {
        tracing::info!("Creating backup");

        fs::create_dir_all(&self.backups_dir).await?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let backup_path = self.backups_dir.join(format!("backup_{}.zip", timestamp));
        let snapshot_path = self.backups_dir.join(format!("{}.db.tmp", timestamp));

        // VACUUM INTO refuses to overwrite
        if fs::try_exists(&snapshot_path).await? {
            fs::remove_file(&snapshot_path).await?;
        }

        sqlx::query("VACUUM INTO ?")
            .bind(snapshot_path.to_string_lossy().as_ref())
            .execute(self.repo.pool())
            .await?;

        tracing::debug!("Database snapshot written to {:?}", snapshot_path);

        let archive = backup_path.clone();
        let snapshot = snapshot_path.clone();
        let packaged = tokio::task::spawn_blocking(move || write_archive(&snapshot, &archive))
            .await
            .map_err(|e| AppError::Backup(format!("Backup task failed: {}", e)));

        // Clean up the snapshot whatever happened to the archive
        if let Err(e) = fs::remove_file(&snapshot_path).await {
            tracing::warn!("Failed to remove snapshot {:?}: {}", snapshot_path, e);
        }
        let manifest_checksum = packaged??;

        let size = fs::metadata(&backup_path).await?.len() as i64;

        let backup = self
            .repo
            .record_backup(backup_path.to_string_lossy().as_ref(), size, &manifest_checksum)
            .await?;

        tracing::info!("Backup created: {:?} ({} bytes)", backup_path, size);

        self.apply_retention_policy().await?;

        Ok(backup)
    }

    /// Keep only the newest archives; older files and their records are removed
    async fn apply_retention_policy(&self) -> Result<()> {
        let backups = self.repo.list_backups().await?;

        if backups.len() <= self.retention {
            return Ok(());
        }

        for backup in backups.iter().skip(self.retention) {
            tracing::info!("Deleting old backup: {}", backup.path);

            if let Err(e) = fs::remove_file(&backup.path).await {
                tracing::warn!("Failed to delete backup file {}: {}", backup.path, e);
            }

            self.repo.delete_backup_record(&backup.id).await?;
        }

        Ok(())
    }

    /// List available backups, newest first
    pub async fn list_backups(&self) -> Result<Vec<Backup>> {
        self.repo.list_backups().await
    }

    /// Check every file of an archive against its manifest
    pub async fn verify_backup(&self, backup_path: &Path) -> Result<BackupManifest> {
        let path = backup_path.to_path_buf();
        tokio::task::spawn_blocking(move || verify_archive(&path))
            .await
            .map_err(|e| AppError::Backup(format!("Verify task failed: {}", e)))?
    }
}

/// Write the snapshot and its manifest into a ZIP; returns the manifest checksum
fn write_archive(snapshot_path: &Path, archive_path: &Path) -> Result<String> {
    let db_data = std::fs::read(snapshot_path)?;

    let manifest = BackupManifest {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        files: vec![FileEntry {
            path: SNAPSHOT_ENTRY.to_string(),
            size: db_data.len() as u64,
            checksum: calculate_checksum(&db_data),
        }],
    };

    let file = std::fs::File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(SNAPSHOT_ENTRY, options)?;
    zip.write_all(&db_data)?;

    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    zip.start_file(MANIFEST_ENTRY, options)?;
    zip.write_all(manifest_json.as_bytes())?;

    zip.finish()?;

    Ok(calculate_checksum(manifest_json.as_bytes()))
}

fn verify_archive(archive_path: &Path) -> Result<BackupManifest> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let manifest = {
        let mut manifest_file = archive.by_name(MANIFEST_ENTRY)?;
        let mut manifest_data = String::new();
        manifest_file.read_to_string(&mut manifest_data)?;
        serde_json::from_str::<BackupManifest>(&manifest_data)?
    };

    for entry in &manifest.files {
        let mut contents = Vec::new();
        archive.by_name(&entry.path)?.read_to_end(&mut contents)?;

        let actual = calculate_checksum(&contents);
        if actual != entry.checksum {
            return Err(AppError::Backup(format!(
                "Checksum mismatch for {}: expected {}, got {}",
                entry.path, entry.checksum, actual
            )));
        }
    }

    tracing::debug!("Verified backup {:?}: {} files", archive_path, manifest.files.len());
    Ok(manifest)
}

fn calculate_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_pool;
    use tempfile::TempDir;

    async fn create_test_service(retention: usize) -> (BackupService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = create_pool(&temp_dir.path().join("bizdesk.db")).await.unwrap();
        let repo = Repository::new(pool);

        let service = BackupService::new(repo, temp_dir.path().join("backups"), retention);

        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_create_backup() {
        let (service, _temp) = create_test_service(5).await;

        let backup = service.create_backup().await.unwrap();

        let path = Path::new(&backup.path);
        assert!(path.exists());
        assert!(backup.path.contains("backup_"));
        assert!(backup.size > 0);
        assert_eq!(backup.manifest_hash.len(), 64);

        // the temporary snapshot is gone
        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().unwrap_or_default() == "tmp")
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_backup_contains_verified_snapshot() {
        let (service, _temp) = create_test_service(5).await;
        service
            .repo
            .record_activity(crate::database::EntityKind::Quotation, Some("q1"), "created")
            .await
            .unwrap();

        let backup = service.create_backup().await.unwrap();
        let manifest = service.verify_backup(Path::new(&backup.path)).await.unwrap();

        assert_eq!(manifest.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].path, SNAPSHOT_ENTRY);

        // the snapshot is a readable database holding the activity row
        let mut archive = zip::ZipArchive::new(std::fs::File::open(&backup.path).unwrap()).unwrap();
        let mut db = Vec::new();
        archive
            .by_name(SNAPSHOT_ENTRY)
            .unwrap()
            .read_to_end(&mut db)
            .unwrap();
        let restored = _temp.path().join("restored.db");
        std::fs::write(&restored, db).unwrap();
        let pool = create_pool(&restored).await.unwrap();
        let activity = Repository::new(pool).list_activity(10).await.unwrap();
        assert_eq!(activity.len(), 1);
    }

    #[tokio::test]
    async fn test_retention_policy() {
        let (service, _temp) = create_test_service(3).await;

        for _ in 0..5 {
            service.create_backup().await.unwrap();
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        let backups = service.list_backups().await.unwrap();
        assert_eq!(backups.len(), 3);
        assert!(backups.iter().all(|b| Path::new(&b.path).exists()));

        let files = std::fs::read_dir(_temp.path().join("backups")).unwrap().count();
        assert_eq!(files, 3);
    }

    #[tokio::test]
    async fn test_verify_corrupted_backup() {
        let (service, _temp) = create_test_service(5).await;

        let backup = service.create_backup().await.unwrap();

        let mut corrupted = std::fs::read(&backup.path).unwrap();
        let middle = corrupted.len() / 2;
        corrupted[middle] ^= 0xFF;
        std::fs::write(&backup.path, &corrupted).unwrap();

        let result = service.verify_backup(Path::new(&backup.path)).await;

        assert!(result.is_err());
    }
}
