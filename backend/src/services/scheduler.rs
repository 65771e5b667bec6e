/// Scheduler Service
/// Runs the periodic export and backup jobs using cron expressions
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::services::{BackupService, ExportService};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Shorthand frequency for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl Frequency {
    /// Convert frequency to cron expression
    pub fn to_cron(self) -> String {
        match self {
            Frequency::Minutes(1) => "0 * * * * *".to_string(),
            Frequency::Minutes(m) => format!("0 */{} * * * *", m),
            Frequency::Hours(1) => "0 0 * * * *".to_string(),
            Frequency::Hours(h) => format!("0 0 */{} * * *", h),
            // Daily at 2 AM
            Frequency::Days(1) => "0 0 2 * * *".to_string(),
            Frequency::Days(d) => format!("0 0 2 */{} * *", d),
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        // "5m", "2h", "3d" or "hourly", "daily", "weekly", "monthly"
        let s = s.trim().to_lowercase();

        match s.as_str() {
            "hourly" => return Ok(Frequency::Hours(1)),
            "daily" => return Ok(Frequency::Days(1)),
            "weekly" => return Ok(Frequency::Days(7)),
            "monthly" => return Ok(Frequency::Days(30)),
            _ => {}
        }

        let Some(unit) = s.chars().last() else {
            return Err("Empty frequency string".to_string());
        };
        let number_part = &s[..s.len() - unit.len_utf8()];

        let value: u32 = number_part
            .parse()
            .map_err(|_| format!("Invalid number in frequency: {}", s))?;

        if value == 0 {
            return Err("Frequency value must be greater than 0".to_string());
        }

        match unit {
            'm' => Ok(Frequency::Minutes(value)),
            'h' => Ok(Frequency::Hours(value)),
            'd' => Ok(Frequency::Days(value)),
            _ => Err(format!(
                "Invalid frequency unit '{}'. Use 'm' (minutes), 'h' (hours), or 'd' (days)",
                unit
            )),
        }
    }
}

/// Resolve a configured schedule: a six-field cron expression is used as is,
/// anything else must be a frequency shorthand
pub fn resolve_schedule(schedule: &str) -> std::result::Result<String, String> {
    let trimmed = schedule.trim();
    if trimmed.split_whitespace().count() == 6 {
        return Ok(trimmed.to_string());
    }
    Frequency::from_str(trimmed).map(Frequency::to_cron)
}

/// Scheduler service for periodic exports and backups
pub struct SchedulerService {
    scheduler: Arc<RwLock<JobScheduler>>,
    jobs: Arc<RwLock<Vec<Uuid>>>,
}

impl SchedulerService {
    /// Create new scheduler service
    pub async fn new() -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            jobs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Register the jobs enabled in the configuration and start ticking
    pub async fn start(
        &self,
        config: &AppConfig,
        export: ExportService,
        backup: BackupService,
    ) -> Result<()> {
        if let Some(schedule) = &config.export_schedule {
            self.schedule_export(schedule, export, config.export_dir())
                .await?;
        }
        if let Some(schedule) = &config.backup_schedule {
            self.schedule_backup(schedule, backup).await?;
        }

        let scheduler = self.scheduler.read().await;
        scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to start scheduler: {}", e)))?;
        tracing::info!("Scheduler started with {} jobs", self.job_count().await);
        Ok(())
    }

    /// Schedule a periodic CSV export into `dir`
    pub async fn schedule_export(
        &self,
        schedule: &str,
        export: ExportService,
        dir: PathBuf,
    ) -> Result<Uuid> {
        let cron_expr = resolve_schedule(schedule).map_err(AppError::Scheduler)?;
        let export = Arc::new(export);
        let dir = Arc::new(dir);

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let export = Arc::clone(&export);
            let dir = Arc::clone(&dir);
            Box::pin(async move {
                tracing::info!("Running scheduled export");
                match export.export_all(&dir).await {
                    Ok(report) => {
                        tracing::info!("Scheduled export written to {:?}", report.directory)
                    }
                    Err(e) => tracing::error!("Scheduled export failed: {}", e),
                }
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create export job: {}", e)))?;

        let id = self.add(job).await?;
        tracing::info!("Export scheduled ({})", cron_expr);
        Ok(id)
    }

    /// Schedule a periodic backup
    pub async fn schedule_backup(&self, schedule: &str, backup: BackupService) -> Result<Uuid> {
        let cron_expr = resolve_schedule(schedule).map_err(AppError::Scheduler)?;
        let backup = Arc::new(backup);

        let job = Job::new_async(cron_expr.clone(), move |_uuid, _l| {
            let backup = Arc::clone(&backup);
            Box::pin(async move {
                tracing::info!("Running scheduled backup");
                match backup.create_backup().await {
                    Ok(record) => tracing::info!("Scheduled backup created: {}", record.path),
                    Err(e) => tracing::error!("Scheduled backup failed: {}", e),
                }
            })
        })
        .map_err(|e| AppError::Scheduler(format!("Failed to create backup job: {}", e)))?;

        let id = self.add(job).await?;
        tracing::info!("Backup scheduled ({})", cron_expr);
        Ok(id)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    async fn add(&self, job: Job) -> Result<Uuid> {
        let scheduler = self.scheduler.write().await;
        let id = scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to schedule job: {}", e)))?;

        self.jobs.write().await.push(id);
        Ok(id)
    }

    /// Shutdown scheduler gracefully
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.write().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduler(format!("Failed to shutdown scheduler: {}", e)))?;
        self.jobs.write().await.clear();
        tracing::info!("Scheduler shutdown");
        Ok(())
    }
}
