use async_trait::async_trait;
use crate::core::Result;
use crate::result::QueryResult;

/// A single session against a relational store.
///
/// The upgrade engine only ever issues statements and transaction
/// boundaries through this trait; it never opens or closes the session.
/// Use [`MemoryConnection`](crate::connection::MemoryConnection) for tests
/// and [`PgConnection`](crate::connection::PgConnection) (or a bare
/// `tokio_postgres::Client`) against PostgreSQL.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run one statement with positional text parameters (`$1`, `$2`, ...).
    async fn query(&self, sql: &str, params: &[&str]) -> Result<QueryResult>;

    /// Run a script as a single unit. The script may hold several statements.
    async fn execute(&self, script: &str) -> Result<QueryResult>;

    /// Check if the session is still usable.
    async fn ping(&self) -> Result<()>;

    async fn begin(&self) -> Result<()> {
        self.execute("BEGIN").await.map(|_| ())
    }

    async fn commit(&self) -> Result<()> {
        self.execute("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK").await.map(|_| ())
    }
}
