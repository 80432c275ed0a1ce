//! Upgrade orchestration.
//!
//! A run validates the manifest, makes sure the version store exists, takes
//! the product's advisory lock and reconciles the manifest with the recorded
//! version. Each pending version is then applied in its own transaction:
//! its tasks in order, then the version record, then COMMIT. The first
//! failure rolls that version back and ends the run. Failures inside a
//! version are reported in the [`UpgradeResult`]; only failures outside a
//! transaction are returned as `Err`.

pub mod observer;
pub mod plan;
pub mod result;
pub mod runner;

pub use observer::{
    IncompatibleEvent, NoopObserver, Observer, PlanEvent, TaskEndEvent, TaskStartEvent,
    TracingObserver, VersionEndEvent, VersionStartEvent,
};
pub use plan::{Reconciliation, reconcile};
pub use result::{UpgradeResult, UpgradeStatus, UpgradeSummary};
pub use runner::{TaskOutcome, TaskRunner};

use crate::core::{DbError, Result};
use crate::interface::Connection;
use crate::manifest::{Manifest, Task, Version};
use crate::store::VersionStore;
use tracing::{debug, warn};

/// Why a version did not commit.
struct VersionFailure<'m> {
    task: Option<&'m Task>,
    script: Option<String>,
    error: DbError,
}

impl VersionFailure<'_> {
    /// A failure not attributable to a task: BEGIN, the version record or COMMIT.
    fn outside_tasks(error: DbError) -> Self {
        Self {
            task: None,
            script: None,
            error,
        }
    }
}

pub struct Upgrader<'o> {
    store: VersionStore,
    observer: &'o dyn Observer,
}

impl Upgrader<'static> {
    pub fn new(store: VersionStore) -> Self {
        Self {
            store,
            observer: &NoopObserver,
        }
    }
}

impl Default for Upgrader<'static> {
    fn default() -> Self {
        Self::new(VersionStore::default())
    }
}

impl<'o> Upgrader<'o> {
    pub fn with_observer<'a>(self, observer: &'a dyn Observer) -> Upgrader<'a> {
        Upgrader {
            store: self.store,
            observer,
        }
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Bring `manifest.product()` up to the manifest's last version.
    ///
    /// The connection stays owned by the caller; every transaction opened
    /// here is committed or rolled back before returning.
    pub async fn upgrade<'m>(
        &self,
        conn: &dyn Connection,
        manifest: &'m Manifest,
    ) -> Result<UpgradeResult<'m>> {
        manifest.validate_structure()?;
        self.store.ensure_initialized(conn).await?;

        let product = manifest.product();
        if !self.store.try_lock(conn, product).await? {
            return Err(DbError::Locked(product.to_string()));
        }

        let outcome = self.run_locked(conn, manifest).await;

        // The lock is session-scoped, so a connection that died mid-run has
        // released it already. The run's own outcome is what gets reported.
        if let Err(err) = self.store.unlock(conn, product).await {
            warn!(product, error = %err, "failed to release upgrade lock");
        }
        outcome
    }

    async fn run_locked<'m>(
        &self,
        conn: &dyn Connection,
        manifest: &'m Manifest,
    ) -> Result<UpgradeResult<'m>> {
        let initial = self
            .store
            .current_version(conn, manifest.product())
            .await?;

        let (existing, pending) = match reconcile(manifest.versions(), initial.as_deref()) {
            Reconciliation::Incompatible => {
                if let Some(recorded) = initial.as_deref() {
                    self.observer.incompatible(&IncompatibleEvent {
                        manifest,
                        recorded_version: recorded,
                    });
                }
                return Ok(UpgradeResult::incompatible(manifest, initial));
            }
            Reconciliation::Plan { existing, pending } => (existing, pending),
        };

        self.observer.plan(&PlanEvent {
            manifest,
            current_version: initial.as_deref(),
            target_version: pending.last().or(existing.last()).map(|v| v.name()),
            existing,
            pending,
        });

        for (idx, version) in pending.iter().enumerate() {
            if let Err(failure) = self.run_version(conn, manifest, version).await {
                let updated = &pending[..idx];
                return Ok(UpgradeResult {
                    result: UpgradeStatus::Error,
                    manifest,
                    initial_version: initial,
                    current_version: updated.last().or(existing.last()),
                    existing_versions: existing,
                    updated_versions: updated,
                    pending_versions: &pending[idx..],
                    failed_version: Some(version),
                    failed_task: failure.task,
                    failed_task_script: failure.script,
                    error: Some(failure.error),
                });
            }
        }

        Ok(UpgradeResult {
            result: UpgradeStatus::Success,
            manifest,
            initial_version: initial,
            current_version: pending.last().or(existing.last()),
            existing_versions: existing,
            updated_versions: pending,
            pending_versions: &[],
            failed_version: None,
            failed_task: None,
            failed_task_script: None,
            error: None,
        })
    }

    async fn run_version<'m>(
        &self,
        conn: &dyn Connection,
        manifest: &'m Manifest,
        version: &'m Version,
    ) -> std::result::Result<(), VersionFailure<'m>> {
        self.observer
            .version_start(&VersionStartEvent { manifest, version });

        let outcome = self.apply_version(conn, manifest, version).await;

        self.observer.version_end(&VersionEndEvent {
            manifest,
            version,
            result: outcome.as_ref().map(|_| ()).map_err(|f| &f.error),
        });
        outcome
    }

    async fn apply_version<'m>(
        &self,
        conn: &dyn Connection,
        manifest: &'m Manifest,
        version: &'m Version,
    ) -> std::result::Result<(), VersionFailure<'m>> {
        conn.begin()
            .await
            .map_err(|e| VersionFailure::outside_tasks(DbError::transaction("begin", e)))?;

        let applied = match self.apply_tasks(conn, manifest, version).await {
            Ok(()) => self
                .store
                .record_version(conn, manifest.product(), version.name())
                .await
                .map_err(VersionFailure::outside_tasks),
            Err(failure) => Err(failure),
        };

        match applied {
            Ok(()) => match conn.commit().await {
                Ok(()) => Ok(()),
                Err(error) => {
                    // A failed COMMIT normally ends the transaction already.
                    self.rollback_quietly(conn, version).await;
                    Err(VersionFailure::outside_tasks(DbError::transaction(
                        "commit", error,
                    )))
                }
            },
            Err(failure) => {
                self.rollback_quietly(conn, version).await;
                Err(failure)
            }
        }
    }

    /// The failure that caused the rollback is the one reported.
    async fn rollback_quietly(&self, conn: &dyn Connection, version: &Version) {
        if let Err(err) = conn.rollback().await {
            debug!(version = version.name(), error = %err, "rollback failed");
        }
    }

    async fn apply_tasks<'m>(
        &self,
        conn: &dyn Connection,
        manifest: &'m Manifest,
        version: &'m Version,
    ) -> std::result::Result<(), VersionFailure<'m>> {
        let runner = TaskRunner::new(conn);

        for task in version.tasks() {
            self.observer.task_start(&TaskStartEvent {
                manifest,
                version,
                task,
            });

            match runner.run(task).await {
                TaskOutcome::Success { script, result } => {
                    self.observer.task_end(&TaskEndEvent {
                        manifest,
                        version,
                        task,
                        script: Some(script.as_str()),
                        result: Ok(&result),
                    });
                }
                TaskOutcome::Failure { script, error } => {
                    self.observer.task_end(&TaskEndEvent {
                        manifest,
                        version,
                        task,
                        script: script.as_deref(),
                        result: Err(&error),
                    });
                    return Err(VersionFailure {
                        task: Some(task),
                        script,
                        error,
                    });
                }
            }
        }

        Ok(())
    }
}
