use std::fs;
use std::path::Path;
use versiondb::{DbError, read_from_file};

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const MANIFEST: &str = "\
product: billing
versions:
  1.0.0:
    - name: create schema
      script: 1.0.0/schema.sql
    - name: create tables
      script: 1.0.0/tables.sql
  0.9.0:
    - name: late fix
      script: fix.sql
";

#[tokio::test]
async fn test_read_from_file() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "manifest.yml", MANIFEST);
    write(dir.path(), "1.0.0/schema.sql", "CREATE SCHEMA billing;");
    write(dir.path(), "1.0.0/tables.sql", "CREATE TABLE billing.t (id integer);");
    write(dir.path(), "fix.sql", "SELECT 1;");

    let manifest = read_from_file(dir.path().join("manifest.yml")).await.unwrap();

    assert_eq!(manifest.product(), "billing");
    assert_eq!(manifest.source(), Some(dir.path().join("manifest.yml").as_path()));

    let versions: Vec<_> = manifest.versions().iter().map(|v| v.name()).collect();
    assert_eq!(versions, vec!["1.0.0", "0.9.0"]);

    let tasks: Vec<_> = manifest.versions()[0]
        .tasks()
        .iter()
        .map(|t| t.name())
        .collect();
    assert_eq!(tasks, vec!["create schema", "create tables"]);

    let task = &manifest.versions()[0].tasks()[0];
    assert_eq!(task.path(), Some(Path::new("1.0.0/schema.sql")));
    assert_eq!(
        task.full_path(),
        Some(dir.path().join("1.0.0/schema.sql").as_path())
    );
    assert_eq!(task.load_script().await.unwrap(), "CREATE SCHEMA billing;");

    manifest.validate_structure().unwrap();
    manifest.validate_scripts_exist().await.unwrap();
}

#[tokio::test]
async fn test_missing_manifest_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_from_file(dir.path().join("absent.yml")).await.unwrap_err();

    match err {
        DbError::IoError(message) => assert!(message.contains("absent.yml")),
        other => panic!("expected IoError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_document() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "manifest.yml", "product: [not, a, string]\n");

    let err = read_from_file(dir.path().join("manifest.yml")).await.unwrap_err();
    assert!(matches!(err, DbError::ParseError(_)));
}

#[tokio::test]
async fn test_validate_scripts_reports_every_unreadable_task() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "manifest.yml", MANIFEST);
    write(dir.path(), "1.0.0/tables.sql", "CREATE TABLE billing.t (id integer);");

    let manifest = read_from_file(dir.path().join("manifest.yml")).await.unwrap();
    let err = manifest.validate_scripts_exist().await.unwrap_err();

    match err {
        DbError::UnreadableScripts(problems) => {
            assert_eq!(problems.len(), 2);
            assert_eq!(problems[0].version, "1.0.0");
            assert_eq!(problems[0].task, "create schema");
            assert!(problems[0].reason.contains("schema.sql"));
            assert_eq!(problems[1].version, "0.9.0");
            assert_eq!(problems[1].task, "late fix");
        }
        other => panic!("expected UnreadableScripts, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scripts_are_loaded_lazily() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "manifest.yml", MANIFEST);

    // Loading the manifest does not touch the scripts.
    let manifest = read_from_file(dir.path().join("manifest.yml")).await.unwrap();
    write(dir.path(), "fix.sql", "SELECT 2;");

    let task = &manifest.versions()[1].tasks()[0];
    assert_eq!(task.load_script().await.unwrap(), "SELECT 2;");
}

#[tokio::test]
async fn test_file_manifest_upgrades_memory_database() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "manifest.yml", MANIFEST);
    write(dir.path(), "1.0.0/schema.sql", "\u{feff}CREATE SCHEMA billing;");
    write(
        dir.path(),
        "1.0.0/tables.sql",
        "-- tables\nCREATE TABLE billing.t (id integer);\nINSERT INTO billing.t VALUES (1);",
    );
    write(dir.path(), "fix.sql", "INSERT INTO billing.t VALUES (2);");

    let manifest = read_from_file(dir.path().join("manifest.yml")).await.unwrap();
    let db = versiondb::MemoryDatabase::new();
    let conn = db.connect();

    let result = versiondb::upgrade(&conn, &manifest, None).await.unwrap();

    assert!(result.is_success());
    assert_eq!(result.current_version_name(), Some("0.9.0"));
    assert_eq!(db.rows("billing", "t").unwrap().unwrap().len(), 2);
}
