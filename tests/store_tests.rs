use versiondb::{DbError, MemoryDatabase, StoreConfig, StoreInit, Value, VersionStore};

#[tokio::test]
async fn test_ensure_initialized_is_idempotent() {
    let db = MemoryDatabase::new();
    let conn = db.connect();

    let first = versiondb::ensure_initialized(&conn).await.unwrap();
    assert_eq!(
        first,
        StoreInit {
            schema_created: true,
            table_created: true
        }
    );

    let second = versiondb::ensure_initialized(&conn).await.unwrap();
    assert_eq!(second, StoreInit::default());
    assert!(db.table_exists("versiondb", "version").unwrap());
}

#[tokio::test]
async fn test_ensure_initialized_creates_only_missing_table() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    versiondb::Connection::execute(&conn, "CREATE SCHEMA versiondb")
        .await
        .unwrap();

    let init = versiondb::ensure_initialized(&conn).await.unwrap();
    assert!(!init.schema_created);
    assert!(init.table_created);
}

#[tokio::test]
async fn test_ensure_initialized_keeps_rows() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    let store = VersionStore::default();
    store.ensure_initialized(&conn).await.unwrap();
    store.record_version(&conn, "app", "1.2.3").await.unwrap();

    store.ensure_initialized(&conn).await.unwrap();

    assert_eq!(
        db.rows("versiondb", "version").unwrap().unwrap(),
        vec![vec![Value::from("app"), Value::from("1.2.3")]]
    );
}

#[tokio::test]
async fn test_store_init_failure_is_wrapped() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    db.inject_failure("CREATE TABLE").unwrap();

    let err = versiondb::ensure_initialized(&conn).await.unwrap_err();
    assert!(matches!(err, DbError::StoreInit(_)));
    assert_eq!(err.code(), Some("XX000"));
}

#[tokio::test]
async fn test_current_version_absent_is_none() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    let store = VersionStore::default();
    store.ensure_initialized(&conn).await.unwrap();

    assert_eq!(store.current_version(&conn, "app").await.unwrap(), None);
}

#[tokio::test]
async fn test_record_version_upserts_single_row() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    let store = VersionStore::default();
    store.ensure_initialized(&conn).await.unwrap();

    store.record_version(&conn, "app", "1.0.0").await.unwrap();
    store.record_version(&conn, "app", "1.0.1").await.unwrap();

    assert_eq!(
        store.current_version(&conn, "app").await.unwrap().as_deref(),
        Some("1.0.1")
    );
    assert_eq!(db.rows("versiondb", "version").unwrap().unwrap().len(), 1);
}

#[tokio::test]
async fn test_inventory_without_table() {
    let db = MemoryDatabase::new();
    let conn = db.connect();

    let inventory = versiondb::inventory(&conn).await.unwrap();
    assert!(!inventory.exists);
    assert!(inventory.products.is_none());
}

#[tokio::test]
async fn test_inventory_sorted_by_product() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    let store = VersionStore::default();
    store.ensure_initialized(&conn).await.unwrap();
    store.record_version(&conn, "zeta", "2").await.unwrap();
    store.record_version(&conn, "alpha", "1").await.unwrap();
    store.record_version(&conn, "mid", "3").await.unwrap();

    let inventory = store.inventory(&conn).await.unwrap();
    assert!(inventory.exists);

    let products: Vec<_> = inventory
        .products
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(
        products,
        vec![
            ("alpha".to_string(), "1".to_string()),
            ("mid".to_string(), "3".to_string()),
            ("zeta".to_string(), "2".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_inventory_serializes_like_the_cli_prints_it() {
    let db = MemoryDatabase::new();
    let conn = db.connect();
    let store = VersionStore::default();
    store.ensure_initialized(&conn).await.unwrap();
    store.record_version(&conn, "app", "1.0.0").await.unwrap();

    let json = serde_json::to_value(store.inventory(&conn).await.unwrap()).unwrap();
    assert_eq!(json["exists"], true);
    assert_eq!(json["products"]["app"], "1.0.0");
}

#[tokio::test]
async fn test_advisory_lock_per_product() {
    let db = MemoryDatabase::new();
    let first = db.connect();
    let second = db.connect();
    let store = VersionStore::default();

    assert!(store.try_lock(&first, "app").await.unwrap());
    assert!(!store.try_lock(&second, "app").await.unwrap());
    assert!(store.try_lock(&second, "other").await.unwrap());

    assert!(store.unlock(&first, "app").await.unwrap());
    assert!(!store.unlock(&first, "app").await.unwrap());
    assert!(store.try_lock(&second, "app").await.unwrap());
}

#[tokio::test]
async fn test_lock_key_includes_store_schema() {
    let db = MemoryDatabase::new();
    let first = db.connect();
    let second = db.connect();
    let default_store = VersionStore::default();
    let other_store = VersionStore::new(StoreConfig::with_schema("tracking").unwrap());

    assert!(default_store.try_lock(&first, "app").await.unwrap());
    assert!(other_store.try_lock(&second, "app").await.unwrap());
}
