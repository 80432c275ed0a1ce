//! Version store: one `(product, version)` row per product in a dedicated
//! schema, `versiondb.version` unless configured otherwise.

use crate::core::{DbError, Result, validate_identifier};
use crate::interface::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_SCHEMA: &str = "versiondb";
pub const DEFAULT_TABLE: &str = "version";

/// Where the version table lives.
///
/// Both names are interpolated into statements, so they must be plain
/// identifiers. They are folded to lower case as PostgreSQL does for
/// unquoted names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    schema: String,
    table: String,
}

impl StoreConfig {
    pub fn new(schema: &str, table: &str) -> Result<Self> {
        validate_identifier(schema)?;
        validate_identifier(table)?;
        Ok(Self {
            schema: schema.to_ascii_lowercase(),
            table: table.to_ascii_lowercase(),
        })
    }

    /// Default table name in a custom schema.
    pub fn with_schema(schema: &str) -> Result<Self> {
        Self::new(schema, DEFAULT_TABLE)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// What [`VersionStore::ensure_initialized`] had to create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreInit {
    pub schema_created: bool,
    pub table_created: bool,
}

/// Every product's recorded version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Inventory {
    /// Whether the version table exists at all.
    pub exists: bool,
    /// `None` when the table does not exist. Ordered by product.
    pub products: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct VersionStore {
    config: StoreConfig,
}

impl VersionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create the schema and table if absent. Existing rows are never touched.
    pub async fn ensure_initialized(&self, conn: &dyn Connection) -> Result<StoreInit> {
        self.initialize(conn)
            .await
            .map_err(|e| DbError::StoreInit(Box::new(e)))
    }

    async fn initialize(&self, conn: &dyn Connection) -> Result<StoreInit> {
        let mut init = StoreInit::default();

        if !self.schema_exists(conn).await? {
            conn.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.config.schema))
                .await?;
            init.schema_created = true;
        }

        if !self.table_exists(conn).await? {
            conn.execute(&format!(
                "CREATE TABLE IF NOT EXISTS {} (product varchar(255) PRIMARY KEY, version varchar(255))",
                self.config.qualified_table()
            ))
            .await?;
            init.table_created = true;
        }

        Ok(init)
    }

    pub async fn schema_exists(&self, conn: &dyn Connection) -> Result<bool> {
        let result = conn
            .query(
                "SELECT 1 FROM information_schema.schemata WHERE schema_name = $1::text",
                &[self.config.schema.as_str()],
            )
            .await?;
        Ok(!result.is_empty())
    }

    pub async fn table_exists(&self, conn: &dyn Connection) -> Result<bool> {
        let result = conn
            .query(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = $1::text AND table_name = $2::text",
                &[self.config.schema.as_str(), self.config.table.as_str()],
            )
            .await?;
        Ok(!result.is_empty())
    }

    /// Recorded version of `product`; `None` means it was never upgraded.
    pub async fn current_version(
        &self,
        conn: &dyn Connection,
        product: &str,
    ) -> Result<Option<String>> {
        let result = conn
            .query(
                &format!(
                    "SELECT version FROM {} WHERE product = $1",
                    self.config.qualified_table()
                ),
                &[product],
            )
            .await?;
        Ok(result.first_text("version"))
    }

    /// Insert or update the product's row in a single statement.
    pub async fn record_version(
        &self,
        conn: &dyn Connection,
        product: &str,
        version: &str,
    ) -> Result<()> {
        conn.query(
            &format!(
                "INSERT INTO {} (product, version) VALUES ($1, $2) \
                 ON CONFLICT (product) DO UPDATE SET version = EXCLUDED.version",
                self.config.qualified_table()
            ),
            &[product, version],
        )
        .await?;
        Ok(())
    }

    pub async fn inventory(&self, conn: &dyn Connection) -> Result<Inventory> {
        if !self.table_exists(conn).await? {
            return Ok(Inventory::default());
        }

        let result = conn
            .query(
                &format!(
                    "SELECT product, version FROM {} ORDER BY product",
                    self.config.qualified_table()
                ),
                &[],
            )
            .await?;

        let products = result
            .rows
            .iter()
            .filter_map(|row| match (row.first(), row.get(1)) {
                (Some(product), Some(version)) => Some((
                    product.as_str()?.to_string(),
                    version.as_str().unwrap_or_default().to_string(),
                )),
                _ => None,
            })
            .collect();

        Ok(Inventory {
            exists: true,
            products: Some(products),
        })
    }

    /// Try to take the session-level advisory lock for `product`.
    /// Returns `false` when another session holds it.
    pub async fn try_lock(&self, conn: &dyn Connection, product: &str) -> Result<bool> {
        let result = conn
            .query(
                "SELECT pg_try_advisory_lock(hashtext($1), hashtext($2)) AS locked",
                &[self.config.schema.as_str(), product],
            )
            .await?;

        result
            .get(0, "locked")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| DbError::ParseError("advisory lock query returned no flag".to_string()))
    }

    pub async fn unlock(&self, conn: &dyn Connection, product: &str) -> Result<bool> {
        let result = conn
            .query(
                "SELECT pg_advisory_unlock(hashtext($1), hashtext($2)) AS unlocked",
                &[self.config.schema.as_str(), product],
            )
            .await?;
        Ok(result
            .get(0, "unlocked")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}
