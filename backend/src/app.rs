//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::cache::{Cache, CacheInvalidator};
use crate::config::AppConfig;
use crate::database::{
    create_pool, Erha, ExpenseDocument, InvoiceDocument, Paragon, PlanningDocument,
    QuotationDocument, Repository, TicketDocument,
};
use crate::error::Result;
use crate::hooks::{ActivityLogger, PostCommitHooks};
use crate::services::{
    BackupService, CalendarService, DashboardService, DocumentService, ExportService,
    LineageService, SchedulerService,
};
use std::sync::Arc;

/// Central application state holding all services
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub repo: Repository,
    pub cache: Cache,
    pub quotations: DocumentService<QuotationDocument>,
    pub invoices: DocumentService<InvoiceDocument>,
    pub paragon_tickets: DocumentService<TicketDocument<Paragon>>,
    pub erha_tickets: DocumentService<TicketDocument<Erha>>,
    pub plannings: DocumentService<PlanningDocument>,
    pub expenses: DocumentService<ExpenseDocument>,
    pub lineage: LineageService,
    pub dashboard: DashboardService,
    pub calendar: CalendarService,
    pub export: ExportService,
    pub backup: BackupService,
    pub scheduler: Arc<SchedulerService>,
}

impl AppState {
    /// Open the datastore, pick a cache backend and wire every service
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("Data directory: {:?}", config.data_dir);

        // Create necessary directories
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.backup_dir())?;
        std::fs::create_dir_all(config.export_dir())?;

        let pool = create_pool(&config.database_path()).await?;
        let repo = Repository::new(pool);
        let cache = build_cache(&config);
        tracing::info!("Cache backend: {}", cache.backend_name());

        let hooks = PostCommitHooks::new()
            .with(Arc::new(CacheInvalidator::new(cache.clone())))
            .with(Arc::new(ActivityLogger::new(repo.clone())));

        let state = Self {
            quotations: DocumentService::new(repo.clone(), cache.clone(), hooks.clone()),
            invoices: DocumentService::new(repo.clone(), cache.clone(), hooks.clone()),
            paragon_tickets: DocumentService::new(repo.clone(), cache.clone(), hooks.clone()),
            erha_tickets: DocumentService::new(repo.clone(), cache.clone(), hooks.clone()),
            plannings: DocumentService::new(repo.clone(), cache.clone(), hooks.clone()),
            expenses: DocumentService::new(repo.clone(), cache.clone(), hooks.clone()),
            lineage: LineageService::new(repo.clone(), hooks),
            dashboard: DashboardService::new(repo.clone(), cache.clone()),
            calendar: CalendarService::new(repo.clone(), cache.clone()),
            export: ExportService::new(repo.clone()),
            backup: BackupService::new(
                repo.clone(),
                config.backup_dir(),
                config.backup_retention as usize,
            ),
            scheduler: Arc::new(SchedulerService::new().await?),
            config,
            repo,
            cache,
        };

        tracing::info!("Application initialized successfully");

        Ok(state)
    }

    /// Start the scheduled export and backup jobs
    pub async fn start_scheduler(&self) -> Result<()> {
        self.scheduler
            .start(&self.config, self.export.clone(), self.backup.clone())
            .await
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.scheduler.shutdown().await {
            tracing::warn!("Failed to stop scheduler: {}", e);
        }
        self.repo.pool().close().await;
        tracing::info!("Application stopped");
    }
}

/// Redis when configured, the in-process cache otherwise; a broken Redis URL
/// degrades to the in-process cache instead of failing startup
fn build_cache(config: &AppConfig) -> Cache {
    if !config.cache_enabled {
        return Cache::disabled();
    }

    match &config.redis_url {
        Some(url) => match Cache::redis(url) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("Redis unavailable ({}), using in-process cache", e);
                Cache::memory()
            }
        },
        None => Cache::memory(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        AppConfig {
            data_dir: dir.path().to_path_buf(),
            export_schedule: None,
            backup_schedule: None,
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_cache_selection() {
        let dir = TempDir::new().unwrap();

        let disabled = AppConfig {
            cache_enabled: false,
            ..config(&dir)
        };
        assert!(!build_cache(&disabled).is_enabled());

        assert_eq!(build_cache(&config(&dir)).backend_name(), "memory");

        let redis = AppConfig {
            redis_url: Some("redis://127.0.0.1:6399/".to_string()),
            ..config(&dir)
        };
        assert_eq!(build_cache(&redis).backend_name(), "redis");
    }

    #[tokio::test]
    async fn test_initialize_creates_layout() {
        let dir = TempDir::new().unwrap();

        let state = AppState::initialize(config(&dir)).await.unwrap();

        assert!(dir.path().join("bizdesk.db").exists());
        assert!(dir.path().join("backups").is_dir());
        assert!(dir.path().join("exports").is_dir());
        state.shutdown().await;
    }
}
