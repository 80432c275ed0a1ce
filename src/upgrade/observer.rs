use crate::core::DbError;
use crate::manifest::{Manifest, Task, Version};
use crate::result::QueryResult;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct IncompatibleEvent<'a> {
    pub manifest: &'a Manifest,
    pub recorded_version: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct PlanEvent<'a> {
    pub manifest: &'a Manifest,
    pub current_version: Option<&'a str>,
    /// Version the product will be at if the run succeeds.
    pub target_version: Option<&'a str>,
    pub existing: &'a [Version],
    pub pending: &'a [Version],
}

#[derive(Debug, Clone, Copy)]
pub struct VersionStartEvent<'a> {
    pub manifest: &'a Manifest,
    pub version: &'a Version,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskStartEvent<'a> {
    pub manifest: &'a Manifest,
    pub version: &'a Version,
    pub task: &'a Task,
}

#[derive(Debug, Clone, Copy)]
pub struct TaskEndEvent<'a> {
    pub manifest: &'a Manifest,
    pub version: &'a Version,
    pub task: &'a Task,
    /// `None` when the script could not be loaded.
    pub script: Option<&'a str>,
    pub result: std::result::Result<&'a QueryResult, &'a DbError>,
}

#[derive(Debug, Clone, Copy)]
pub struct VersionEndEvent<'a> {
    pub manifest: &'a Manifest,
    pub version: &'a Version,
    pub result: std::result::Result<(), &'a DbError>,
}

/// Progress notifications for an upgrade run.
///
/// Either `incompatible` or `plan` is called once. When work is pending,
/// each attempted version gets `version_start`, a `task_start`/`task_end`
/// pair per attempted task, and `version_end`. Nothing follows a failed
/// `version_end`.
pub trait Observer: Send + Sync {
    fn incompatible(&self, _event: &IncompatibleEvent<'_>) {}

    fn plan(&self, _event: &PlanEvent<'_>) {}

    fn version_start(&self, _event: &VersionStartEvent<'_>) {}

    fn task_start(&self, _event: &TaskStartEvent<'_>) {}

    fn task_end(&self, _event: &TaskEndEvent<'_>) {}

    fn version_end(&self, _event: &VersionEndEvent<'_>) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn incompatible(&self, event: &IncompatibleEvent<'_>) {
        warn!(
            "product '{}' is at version '{}' which the manifest does not declare",
            event.manifest.product(),
            event.recorded_version
        );
    }

    fn plan(&self, event: &PlanEvent<'_>) {
        info!(
            product = event.manifest.product(),
            current = event.current_version.unwrap_or("-"),
            target = event.target_version.unwrap_or("-"),
            existing = event.existing.len(),
            pending = event.pending.len(),
            "upgrade plan"
        );
    }

    fn version_start(&self, event: &VersionStartEvent<'_>) {
        info!(
            product = event.manifest.product(),
            version = event.version.name(),
            "version started"
        );
    }

    fn task_start(&self, event: &TaskStartEvent<'_>) {
        info!(
            version = event.version.name(),
            task = event.task.name(),
            "task started"
        );
    }

    fn task_end(&self, event: &TaskEndEvent<'_>) {
        match event.result {
            Ok(result) => info!(
                version = event.version.name(),
                task = event.task.name(),
                rows = result.rows_affected,
                "task finished"
            ),
            Err(err) => error!(
                "task '{}' of version '{}' failed: {}",
                event.task.name(),
                event.version.name(),
                err
            ),
        }
    }

    fn version_end(&self, event: &VersionEndEvent<'_>) {
        match event.result {
            Ok(()) => info!(
                product = event.manifest.product(),
                version = event.version.name(),
                "version committed"
            ),
            Err(err) => error!(
                "version '{}' of '{}' rolled back: {}",
                event.version.name(),
                event.manifest.product(),
                err
            ),
        }
    }
}
