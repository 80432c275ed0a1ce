use super::task::Task;
use super::version::Version;
use super::Manifest;
use crate::core::{DbError, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value as YamlValue};
use std::path::Path;
use tracing::debug;

/// On-disk manifest shape:
///
/// ```yaml
/// product: billing
/// versions:
///   1.0.0:
///     - name: create schema
///       script: 1.0.0/schema.sql
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDocument {
    product: String,
    #[serde(default)]
    versions: Mapping,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskDocument {
    name: String,
    script: String,
}

/// Read a YAML manifest. Task scripts resolve relative to the file's directory.
pub async fn read_from_file(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
        DbError::IoError(format!("The file {} could not be opened: {}", path.display(), e))
    })?;

    debug!(path = %path.display(), "manifest read");
    parse_manifest(&contents, Some(path))
}

/// Parse manifest text. `source` is the file it came from, used to resolve
/// script paths; without it paths are taken as given.
pub fn parse_manifest(contents: &str, source: Option<&Path>) -> Result<Manifest> {
    let document: ManifestDocument = serde_yaml::from_str(contents)
        .map_err(|e| DbError::ParseError(format!("Invalid manifest document: {}", e)))?;

    let base_dir = source.and_then(Path::parent);
    let mut versions = Vec::with_capacity(document.versions.len());

    for (key, value) in document.versions {
        let name = version_name(&key)?;
        let tasks: Vec<TaskDocument> = serde_yaml::from_value(value).map_err(|e| {
            DbError::ParseError(format!("Invalid task list for version '{}': {}", name, e))
        })?;

        let tasks = tasks
            .into_iter()
            .map(|t| Task::file(t.name, t.script, base_dir))
            .collect();
        versions.push(Version::new(name, tasks));
    }

    Ok(Manifest::new(
        document.product,
        source.map(Path::to_path_buf),
        versions,
    ))
}

fn version_name(key: &YamlValue) -> Result<String> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        other => Err(DbError::ParseError(format!(
            "Version names must be strings, found {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_keeps_mapping_order() {
        let manifest = parse_manifest(
            "product: app\nversions:\n  '2.0': []\n  '1.0':\n    - name: a\n      script: a.sql\n",
            None,
        )
        .unwrap();

        let names: Vec<_> = manifest.versions().iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["2.0", "1.0"]);
        assert_eq!(manifest.versions()[1].tasks()[0].path(), Some(Path::new("a.sql")));
    }

    #[test]
    fn test_parse_resolves_against_source_directory() {
        let manifest = parse_manifest(
            "product: app\nversions:\n  1.0.0:\n    - name: a\n      script: sql/a.sql\n",
            Some(Path::new("/srv/app/manifest.yml")),
        )
        .unwrap();

        let task = &manifest.versions()[0].tasks()[0];
        assert_eq!(task.full_path(), Some(PathBuf::from("/srv/app/sql/a.sql").as_path()));
        assert_eq!(manifest.source(), Some(Path::new("/srv/app/manifest.yml")));
    }

    #[test]
    fn test_missing_versions_is_empty_manifest() {
        let manifest = parse_manifest("product: app\n", None).unwrap();
        assert!(manifest.versions().is_empty());
    }

    #[test]
    fn test_rejects_bad_documents() {
        assert!(matches!(
            parse_manifest("versions: {}\n", None),
            Err(DbError::ParseError(_))
        ));
        assert!(matches!(
            parse_manifest("product: app\nextra: 1\n", None),
            Err(DbError::ParseError(_))
        ));
        assert!(matches!(
            parse_manifest("product: app\nversions:\n  1.0.0:\n    - name: a\n", None),
            Err(DbError::ParseError(_))
        ));
        assert!(matches!(
            parse_manifest("product: app\nversions:\n  1.0.0: nope\n", None),
            Err(DbError::ParseError(_))
        ));
    }
}
