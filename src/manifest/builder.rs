use super::task::Task;
use super::version::Version;
use super::Manifest;
use std::path::PathBuf;

/// Builds a [`Manifest`] in memory.
///
/// # Examples
///
/// ```
/// use versiondb::ManifestBuilder;
///
/// let manifest = ManifestBuilder::new("billing")
///     .version("1.0.0", [("schema", "CREATE SCHEMA billing")])
///     .build();
/// assert_eq!(manifest.versions().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    product: String,
    source: Option<PathBuf>,
    versions: Vec<Version>,
}

impl ManifestBuilder {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            ..Default::default()
        }
    }

    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Append a version whose tasks are inline `(name, script)` pairs.
    pub fn version<N, S>(mut self, name: &str, tasks: impl IntoIterator<Item = (N, S)>) -> Self
    where
        N: Into<String>,
        S: Into<String>,
    {
        let tasks = tasks
            .into_iter()
            .map(|(task, script)| Task::inline(task, script))
            .collect();
        self.versions.push(Version::new(name, tasks));
        self
    }

    /// Append a version with arbitrary task sources.
    pub fn version_with_tasks(mut self, name: &str, tasks: Vec<Task>) -> Self {
        self.versions.push(Version::new(name, tasks));
        self
    }

    pub fn build(self) -> Manifest {
        Manifest::new(self.product, self.source, self.versions)
    }
}
