use crate::core::DbError;
use crate::manifest::{Manifest, Task, Version};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeStatus {
    Success,
    Error,
    Incompatible,
}

/// Outcome of one upgrade run. Borrows the manifest it was computed from.
#[derive(Debug)]
pub struct UpgradeResult<'m> {
    pub result: UpgradeStatus,
    pub manifest: &'m Manifest,
    /// Version recorded before the run started.
    pub initial_version: Option<String>,
    /// Version recorded once the run finished.
    pub current_version: Option<&'m Version>,
    pub existing_versions: &'m [Version],
    /// Versions committed by this run, in order.
    pub updated_versions: &'m [Version],
    /// Versions not applied; on error this starts with the failed version.
    pub pending_versions: &'m [Version],
    pub failed_version: Option<&'m Version>,
    pub failed_task: Option<&'m Task>,
    pub failed_task_script: Option<String>,
    pub error: Option<DbError>,
}

impl<'m> UpgradeResult<'m> {
    pub(crate) fn incompatible(manifest: &'m Manifest, initial_version: Option<String>) -> Self {
        Self {
            result: UpgradeStatus::Incompatible,
            manifest,
            initial_version,
            current_version: None,
            existing_versions: &[],
            updated_versions: &[],
            pending_versions: &[],
            failed_version: None,
            failed_task: None,
            failed_task_script: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == UpgradeStatus::Success
    }

    /// Successful run that found nothing to apply.
    pub fn is_up_to_date(&self) -> bool {
        self.is_success() && self.updated_versions.is_empty()
    }

    pub fn current_version_name(&self) -> Option<&str> {
        self.current_version.map(|v| v.name())
    }

    /// Owned, serializable copy for reporting.
    pub fn summary(&self) -> UpgradeSummary {
        UpgradeSummary {
            product: self.manifest.product().to_string(),
            result: self.result,
            initial_version: self.initial_version.clone(),
            current_version: self.current_version_name().map(str::to_string),
            existing_versions: names(self.existing_versions),
            updated_versions: names(self.updated_versions),
            pending_versions: names(self.pending_versions),
            failed_version: self.failed_version.map(|v| v.name().to_string()),
            failed_task: self.failed_task.map(|t| t.name().to_string()),
            failed_task_script: self.failed_task_script.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

fn names(versions: &[Version]) -> Vec<String> {
    versions.iter().map(|v| v.name().to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeSummary {
    pub product: String,
    pub result: UpgradeStatus,
    pub initial_version: Option<String>,
    pub current_version: Option<String>,
    pub existing_versions: Vec<String>,
    pub updated_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub failed_version: Option<String>,
    pub failed_task: Option<String>,
    pub failed_task_script: Option<String>,
    pub error: Option<String>,
}
