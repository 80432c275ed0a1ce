use crate::core::{DbError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a task's script text comes from.
///
/// Nothing outside the manifest module needs to know which variant a task
/// holds; the runner only ever calls [`Task::load_script`].
#[async_trait]
pub trait ScriptSource: Send + Sync + fmt::Debug {
    /// Resolve the script text.
    async fn load_script(&self) -> Result<String>;

    /// Check the script can be resolved without keeping its text.
    async fn check(&self) -> Result<()> {
        self.load_script().await.map(|_| ())
    }

    /// Path as declared in the manifest, for file-backed scripts.
    fn path(&self) -> Option<&Path> {
        None
    }

    /// Path the script is actually read from, for file-backed scripts.
    fn full_path(&self) -> Option<&Path> {
        None
    }
}

/// A script read lazily from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileScript {
    path: PathBuf,
    full_path: PathBuf,
}

impl FileScript {
    /// `path` is resolved against `base_dir` unless it is absolute.
    pub fn new(path: impl Into<PathBuf>, base_dir: Option<&Path>) -> Self {
        let path = path.into();
        let full_path = match base_dir {
            Some(dir) => dir.join(&path),
            None => path.clone(),
        };
        Self { path, full_path }
    }

    fn unreadable(&self, reason: impl fmt::Display) -> DbError {
        DbError::IoError(format!("{}: {}", self.full_path.display(), reason))
    }
}

#[async_trait]
impl ScriptSource for FileScript {
    async fn load_script(&self) -> Result<String> {
        let text = tokio::fs::read_to_string(&self.full_path)
            .await
            .map_err(|e| self.unreadable(e))?;

        Ok(match text.strip_prefix('\u{feff}') {
            Some(stripped) => stripped.to_string(),
            None => text,
        })
    }

    async fn check(&self) -> Result<()> {
        let file = tokio::fs::File::open(&self.full_path)
            .await
            .map_err(|e| self.unreadable(e))?;
        let metadata = file.metadata().await.map_err(|e| self.unreadable(e))?;
        if !metadata.is_file() {
            return Err(self.unreadable("not a regular file"));
        }
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn full_path(&self) -> Option<&Path> {
        Some(&self.full_path)
    }
}

/// A script declared in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineScript {
    text: String,
}

impl InlineScript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ScriptSource for InlineScript {
    async fn load_script(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

/// One executable unit within a version.
#[derive(Debug)]
pub struct Task {
    name: String,
    source: Box<dyn ScriptSource>,
}

impl Task {
    pub fn new(name: impl Into<String>, source: impl ScriptSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: Box::new(source),
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>, base_dir: Option<&Path>) -> Self {
        Self::new(name, FileScript::new(path, base_dir))
    }

    pub fn inline(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, InlineScript::new(script))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &dyn ScriptSource {
        self.source.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.source.path()
    }

    pub fn full_path(&self) -> Option<&Path> {
        self.source.full_path()
    }

    /// Resolve the script text, tagging any failure with this task's name.
    pub async fn load_script(&self) -> Result<String> {
        self.source
            .load_script()
            .await
            .map_err(|e| self.load_error(e))
    }

    pub async fn check_script(&self) -> Result<()> {
        self.source.check().await.map_err(|e| self.load_error(e))
    }

    fn load_error(&self, err: DbError) -> DbError {
        match err {
            DbError::ScriptLoad { .. } => err,
            DbError::IoError(reason) => DbError::ScriptLoad {
                task: self.name.clone(),
                reason,
            },
            other => DbError::ScriptLoad {
                task: self.name.clone(),
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_inline_script() {
        let task = Task::inline("create", "CREATE TABLE t (id integer)");
        assert_eq!(task.name(), "create");
        assert_eq!(task.load_script().await.unwrap(), "CREATE TABLE t (id integer)");
        assert!(task.path().is_none());
    }

    #[tokio::test]
    async fn test_file_script_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("a.sql")).unwrap();
        file.write_all("\u{feff}SELECT 1;".as_bytes()).unwrap();

        let task = Task::file("a", "a.sql", Some(dir.path()));
        assert_eq!(task.path(), Some(Path::new("a.sql")));
        assert_eq!(task.full_path(), Some(dir.path().join("a.sql").as_path()));
        assert_eq!(task.load_script().await.unwrap(), "SELECT 1;");
        assert!(task.check_script().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_is_script_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = Task::file("gone", "missing.sql", Some(dir.path()));

        match task.load_script().await {
            Err(DbError::ScriptLoad { task, reason }) => {
                assert_eq!(task, "gone");
                assert!(reason.contains("missing.sql"));
            }
            other => panic!("expected ScriptLoad, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_directory_is_not_a_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("scripts")).unwrap();
        let task = Task::file("dir", "scripts", Some(dir.path()));

        assert!(task.check_script().await.is_err());
    }
}
