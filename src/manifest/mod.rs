//! Manifest model: a product's ordered versions and their ordered tasks.
//!
//! A manifest is built once, by [`read_from_file`] or [`ManifestBuilder`],
//! and is read-only afterwards. Version order is declaration order; names
//! are opaque and never re-sorted.

pub mod builder;
pub mod loader;
pub mod task;
pub mod version;

pub use builder::ManifestBuilder;
pub use loader::{parse_manifest, read_from_file};
pub use task::{FileScript, InlineScript, ScriptSource, Task};
pub use version::Version;

use crate::core::{DbError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Manifest {
    product: String,
    source: Option<PathBuf>,
    versions: Vec<Version>,
}

impl Manifest {
    pub fn new(product: impl Into<String>, source: Option<PathBuf>, versions: Vec<Version>) -> Self {
        Self {
            product: product.into(),
            source,
            versions,
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// File this manifest was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// First version with this name.
    pub fn version(&self, name: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.name() == name)
    }

    pub fn last_version(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Check every task's script, reporting all unreadable ones at once.
    pub async fn validate_scripts_exist(&self) -> Result<()> {
        let mut problems = Vec::new();
        for version in &self.versions {
            problems.extend(version.script_problems().await);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DbError::UnreadableScripts(problems))
        }
    }

    /// Reject an empty product name, repeated version names and repeated
    /// task names within a version. Every problem is reported.
    pub fn validate_structure(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.product.trim().is_empty() {
            problems.push("product name is empty".to_string());
        }

        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        for version in &self.versions {
            if version.name().trim().is_empty() {
                problems.push("version name is empty".to_string());
            }
            if !seen.insert(version.name()) && reported.insert(version.name()) {
                problems.push(format!("version '{}' is declared more than once", version.name()));
            }
            for task in version.duplicate_task_names() {
                problems.push(format!(
                    "task '{}' is declared more than once in version '{}'",
                    task,
                    version.name()
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DbError::InvalidManifest(problems))
        }
    }
}
