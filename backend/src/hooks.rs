//! Post-commit hooks
//!
//! Side effects that follow a committed write (cache eviction, activity log)
//! run here, after the transaction and outside the caller's path. Each hook
//! runs in its own task: an error or a panic in one hook is logged and does
//! not affect the others or the response already returned.

use crate::cache::CacheInvalidator;
use crate::database::{EntityKind, Repository};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Created,
    Updated,
    StatusChanged,
    Deleted,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::StatusChanged => "status_changed",
            ChangeAction::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed change to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: EntityKind,
    pub id: Option<String>,
    pub action: ChangeAction,
}

impl ChangeEvent {
    pub fn new(kind: EntityKind, id: impl Into<String>, action: ChangeAction) -> Self {
        Self {
            kind,
            id: Some(id.into()),
            action,
        }
    }
}

#[async_trait]
pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, event: &ChangeEvent) -> Result<()>;
}

/// Ordered list of hooks run after every committed write
#[derive(Clone, Default)]
pub struct PostCommitHooks {
    hooks: Vec<Arc<dyn PostCommitHook>>,
}

impl PostCommitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: Arc<dyn PostCommitHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in the background; the caller does not wait
    pub fn fire(&self, event: ChangeEvent) -> JoinHandle<()> {
        let hooks = self.clone();
        tokio::spawn(async move { hooks.run_all(&event).await })
    }

    /// Run every hook, each in its own task, and wait for all of them
    pub async fn run_all(&self, event: &ChangeEvent) {
        let tasks: Vec<(&'static str, JoinHandle<Result<()>>)> = self
            .hooks
            .iter()
            .map(|hook| {
                let hook = Arc::clone(hook);
                let event = event.clone();
                (hook.name(), tokio::spawn(async move { hook.run(&event).await }))
            })
            .collect();

        for (name, task) in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!("Post-commit hook {} failed for {:?}: {}", name, event, e)
                }
                Err(e) if e.is_panic() => {
                    tracing::error!("Post-commit hook {} panicked for {:?}", name, event)
                }
                Err(e) => tracing::warn!("Post-commit hook {} was cancelled: {}", name, e),
            }
        }
    }
}

#[async_trait]
impl PostCommitHook for CacheInvalidator {
    fn name(&self) -> &'static str {
        "cache_invalidator"
    }

    async fn run(&self, event: &ChangeEvent) -> Result<()> {
        self.invalidate(event.kind, event.id.as_deref()).await;
        Ok(())
    }
}

/// Appends committed changes to the `activity_log` table
pub struct ActivityLogger {
    repo: Repository,
}

impl ActivityLogger {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl PostCommitHook for ActivityLogger {
    fn name(&self) -> &'static str {
        "activity_logger"
    }

    async fn run(&self, event: &ChangeEvent) -> Result<()> {
        self.repo
            .record_activity(event.kind, event.id.as_deref(), event.action.as_str())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::create_memory_pool;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl PostCommitHook for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        async fn run(&self, _event: &ChangeEvent) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl PostCommitHook for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _event: &ChangeEvent) -> Result<()> {
            Err(AppError::Generic("sheet unreachable".into()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl PostCommitHook for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn run(&self, _event: &ChangeEvent) -> Result<()> {
            panic!("hook bug");
        }
    }

    fn event() -> ChangeEvent {
        ChangeEvent::new(EntityKind::Invoice, "i1", ChangeAction::Updated)
    }

    #[tokio::test]
    async fn test_failing_and_panicking_hooks_are_isolated() {
        let count = Arc::new(AtomicUsize::new(0));
        let hooks = PostCommitHooks::new()
            .with(Arc::new(Failing))
            .with(Arc::new(Panicking))
            .with(Arc::new(Counter(count.clone())));

        hooks.run_all(&event()).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fire_runs_in_background() {
        let count = Arc::new(AtomicUsize::new(0));
        let hooks = PostCommitHooks::new().with(Arc::new(Counter(count.clone())));

        hooks.fire(event()).await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activity_logger_records_event() {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let hooks = PostCommitHooks::new().with(Arc::new(ActivityLogger::new(repo.clone())));

        hooks.run_all(&event()).await;

        let entries = repo.list_activity(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_kind, "invoice");
        assert_eq!(entries[0].action, "updated");
    }
}
