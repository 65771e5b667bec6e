//! Services module
//!
//! Business logic services that coordinate between commands and repository.

pub mod backup;
pub mod calendar;
pub mod dashboard;
pub mod documents;
pub mod export;
pub mod lineage;
pub mod scheduler;

pub use backup::BackupService;
pub use calendar::CalendarService;
pub use dashboard::{DashboardService, DashboardSummary};
pub use documents::DocumentService;
pub use export::ExportService;
pub use lineage::LineageService;
pub use scheduler::SchedulerService;
