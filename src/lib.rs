// ============================================================================
// versiondb Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod interface;
pub mod manifest;
pub mod result;
pub mod store;
pub mod upgrade;

// Re-export main types for convenience
pub use crate::core::{DbError, Result, ScriptProblem, Value};
pub use interface::Connection;
pub use result::QueryResult;

pub use connection::{ConnectionConfig, MemoryConnection, MemoryDatabase, PgConnection};
pub use manifest::{
    FileScript, InlineScript, Manifest, ManifestBuilder, ScriptSource, Task, Version,
    read_from_file,
};
pub use store::{Inventory, StoreConfig, StoreInit, VersionStore};
pub use upgrade::{
    NoopObserver, Observer, TracingObserver, UpgradeResult, UpgradeStatus, UpgradeSummary,
    Upgrader,
};

// ============================================================================
// Top-level operations on the default `versiondb.version` store
// ============================================================================

/// Create the `versiondb` schema and version table if they are missing.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> versiondb::Result<()> {
/// let db = versiondb::MemoryDatabase::new();
/// let conn = db.connect();
///
/// let first = versiondb::ensure_initialized(&conn).await?;
/// assert!(first.schema_created && first.table_created);
///
/// let second = versiondb::ensure_initialized(&conn).await?;
/// assert!(!second.schema_created && !second.table_created);
/// # Ok(())
/// # }
/// ```
pub async fn ensure_initialized(conn: &dyn Connection) -> Result<StoreInit> {
    VersionStore::default().ensure_initialized(conn).await
}

/// Recorded version of every product, sorted by product.
pub async fn inventory(conn: &dyn Connection) -> Result<Inventory> {
    VersionStore::default().inventory(conn).await
}

/// Apply every pending version of `manifest`.
///
/// # Examples
///
/// ```
/// use versiondb::{ManifestBuilder, MemoryDatabase, UpgradeStatus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> versiondb::Result<()> {
/// let db = MemoryDatabase::new();
/// let conn = db.connect();
/// let manifest = ManifestBuilder::new("billing")
///     .version("1.0.0", [("schema", "CREATE SCHEMA billing")])
///     .build();
///
/// let result = versiondb::upgrade(&conn, &manifest, None).await?;
/// assert_eq!(result.result, UpgradeStatus::Success);
/// assert_eq!(result.current_version_name(), Some("1.0.0"));
/// # Ok(())
/// # }
/// ```
pub async fn upgrade<'m>(
    conn: &dyn Connection,
    manifest: &'m Manifest,
    observer: Option<&dyn Observer>,
) -> Result<UpgradeResult<'m>> {
    let upgrader = Upgrader::default();
    match observer {
        Some(observer) => upgrader.with_observer(observer).upgrade(conn, manifest).await,
        None => upgrader.upgrade(conn, manifest).await,
    }
}
