mod catalog;
mod parser;
mod transaction;

use crate::core::{DbError, Result, Value};
use crate::interface::Connection;
use crate::result::QueryResult;
use async_trait::async_trait;
use catalog::Catalog;
use parser::{AdvisoryCall, Control, ParsedStatement, StatementKind, advisory_call, parse_script};
use sqlparser::ast as sql_ast;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};
use transaction::Transaction;

type LockKey = (String, String);

/// An in-process database understanding the SQL subset the version store
/// and typical test scripts use.
///
/// Cloning yields another handle to the same data. Each [`connect`](Self::connect)
/// opens an independent session with its own transaction state and
/// advisory locks.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

struct Shared {
    /// Committed state only; open transactions work on their own copies.
    catalog: Mutex<Catalog>,
    /// Advisory locks: key -> (owning session, re-entry count)
    locks: Mutex<HashMap<LockKey, (u64, u32)>>,
    failures: Mutex<Vec<String>>,
    next_session: AtomicU64,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            catalog: Mutex::new(Catalog::new()),
            locks: Mutex::new(HashMap::new()),
            failures: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(1),
        }
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session.
    pub fn connect(&self) -> MemoryConnection {
        let id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        debug!(session = id, "memory session opened");
        MemoryConnection {
            id,
            db: self.clone(),
            session: Mutex::new(Session::default()),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.shared.catalog.lock()?.has_schema(schema))
    }

    pub fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        Ok(self.shared.catalog.lock()?.has_table(schema, table))
    }

    /// Committed rows of a table, `None` if it does not exist.
    pub fn rows(&self, schema: &str, table: &str) -> Result<Option<Vec<Vec<Value>>>> {
        Ok(self.shared.catalog.lock()?.rows(schema, table))
    }

    /// Make every later statement containing `needle` fail with SQLSTATE `XX000`.
    pub fn inject_failure(&self, needle: &str) -> Result<()> {
        self.shared.failures.lock()?.push(needle.to_string());
        Ok(())
    }

    pub fn clear_failures(&self) -> Result<()> {
        self.shared.failures.lock()?.clear();
        Ok(())
    }

    /// Whether any session holds the advisory lock on `(first, second)`.
    pub fn is_locked(&self, first: &str, second: &str) -> Result<bool> {
        let key = (first.to_string(), second.to_string());
        Ok(self.shared.locks.lock()?.contains_key(&key))
    }

    fn injected_failure(&self, sql: &str) -> Result<Option<DbError>> {
        let failures = self.shared.failures.lock()?;
        Ok(failures.iter().find(|needle| sql.contains(needle.as_str())).map(|needle| {
            DbError::database("XX000", format!("injected failure matching '{}'", needle))
        }))
    }

    fn snapshot(&self) -> Result<Catalog> {
        Ok(self.shared.catalog.lock()?.clone())
    }

    /// Runs one statement outside a transaction block. It takes effect
    /// whole or not at all.
    fn autocommit(&self, statement: &sql_ast::Statement, params: &[&str]) -> Result<QueryResult> {
        let mut catalog = self.shared.catalog.lock()?;
        let mut next = catalog.clone();
        let mut changes = Vec::new();
        let result = next.execute(statement, params, &mut changes)?;
        if !changes.is_empty() {
            *catalog = next;
        }
        Ok(result)
    }
}

#[derive(Default)]
struct Session {
    transaction: Option<Transaction>,
    closed: bool,
}

/// A session on a [`MemoryDatabase`].
///
/// BEGIN gives the session a private copy of the committed catalog. Its
/// statements change only that copy and COMMIT replays them onto the shared
/// catalog, so ROLLBACK never touches what other sessions committed in the
/// meantime. A failed statement inside a transaction leaves it aborted
/// until ROLLBACK, as PostgreSQL does.
pub struct MemoryConnection {
    id: u64,
    db: MemoryDatabase,
    session: Mutex<Session>,
    log: Mutex<Vec<String>>,
}

impl MemoryConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Every statement this session received, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn in_transaction(&self) -> bool {
        self.session
            .lock()
            .map(|s| s.transaction.is_some())
            .unwrap_or(false)
    }

    /// Discard any open transaction, release advisory locks and refuse
    /// further statements.
    pub fn close(&self) -> Result<()> {
        let mut session = self.session.lock()?;
        if session.transaction.take().is_some() {
            debug!(session = self.id, "open transaction discarded on close");
        }
        session.closed = true;
        drop(session);
        self.release_locks()
    }

    fn release_locks(&self) -> Result<()> {
        let mut locks = self.db.shared.locks.lock()?;
        locks.retain(|_, (owner, _)| *owner != self.id);
        Ok(())
    }

    /// Parses a script. One that does not parse aborts the open
    /// transaction like any other failed statement.
    fn parse(&self, script: &str) -> Result<Vec<ParsedStatement>> {
        let err = match parse_script(script) {
            Ok(statements) => return Ok(statements),
            Err(err) => err,
        };

        let mut session = self.session.lock()?;
        if session.closed {
            return Err(closed());
        }
        self.log.lock()?.push(script.trim().to_string());
        if let Some(tx) = session.transaction.as_mut() {
            tx.abort();
        }
        Err(err)
    }

    fn run_statement(&self, statement: &ParsedStatement, params: &[&str]) -> Result<QueryResult> {
        let mut session = self.session.lock()?;
        if session.closed {
            return Err(closed());
        }
        self.log.lock()?.push(statement.text.clone());
        trace!(session = self.id, sql = %statement.text, "statement");

        let sql = match &statement.kind {
            StatementKind::Control(control) => {
                return self.run_control(&mut session, *control, &statement.text);
            }
            StatementKind::Sql(sql) => sql,
        };

        if session.transaction.as_ref().is_some_and(Transaction::is_aborted) {
            return Err(DbError::database(
                "25P02",
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }

        let outcome = self.run_sql(&mut session, &statement.text, sql, params);
        if outcome.is_err() {
            if let Some(tx) = session.transaction.as_mut() {
                tx.abort();
            }
        }
        outcome
    }

    fn run_sql(
        &self,
        session: &mut Session,
        text: &str,
        sql: &sql_ast::Statement,
        params: &[&str],
    ) -> Result<QueryResult> {
        if let Some(err) = self.db.injected_failure(text)? {
            return Err(err);
        }
        if let Some(call) = advisory_call(sql, params)? {
            return self.run_advisory(call);
        }
        match session.transaction.as_mut() {
            Some(tx) => tx.execute(sql, params),
            None => self.db.autocommit(sql, params),
        }
    }

    fn run_control(&self, session: &mut Session, control: Control, sql: &str) -> Result<QueryResult> {
        if let Some(err) = self.db.injected_failure(sql)? {
            // A failed COMMIT still ends the transaction, without publishing it.
            if control == Control::Commit {
                session.transaction = None;
            }
            return Err(err);
        }

        match control {
            Control::Begin => {
                if session.transaction.is_none() {
                    session.transaction = Some(Transaction::begin(self.db.snapshot()?));
                }
            }
            Control::Commit => {
                if let Some(tx) = session.transaction.take() {
                    if tx.is_aborted() {
                        debug!(session = self.id, "aborted transaction rolled back at COMMIT");
                    } else {
                        let changes = tx.publish(&self.db.shared.catalog)?;
                        trace!(session = self.id, changes, "transaction committed");
                    }
                }
            }
            Control::Rollback => {
                session.transaction = None;
            }
        }
        Ok(QueryResult::empty())
    }

    fn run_advisory(&self, call: AdvisoryCall) -> Result<QueryResult> {
        let mut locks = self.db.shared.locks.lock()?;
        let granted = if call.acquire {
            match locks.get_mut(&call.key) {
                Some((owner, count)) if *owner == self.id => {
                    *count += 1;
                    true
                }
                Some(_) => false,
                None => {
                    locks.insert(call.key, (self.id, 1));
                    true
                }
            }
        } else {
            match locks.get_mut(&call.key) {
                Some((owner, count)) if *owner == self.id => {
                    *count -= 1;
                    if *count == 0 {
                        locks.remove(&call.key);
                    }
                    true
                }
                _ => false,
            }
        };

        Ok(QueryResult::new(
            vec![call.column],
            vec![vec![Value::Boolean(granted)]],
        ))
    }

    /// Opens the transaction that makes a multi-statement script atomic.
    /// `false` when a transaction block is already open.
    fn begin_implicit(&self) -> Result<bool> {
        let mut session = self.session.lock()?;
        if session.closed || session.transaction.is_some() {
            return Ok(false);
        }
        session.transaction = Some(Transaction::begin(self.db.snapshot()?));
        Ok(true)
    }

    fn end_implicit(&self, commit: bool) -> Result<()> {
        let Some(tx) = self.session.lock()?.transaction.take() else {
            return Ok(());
        };
        if commit {
            tx.publish(&self.db.shared.catalog)?;
        }
        Ok(())
    }
}

fn closed() -> DbError {
    DbError::Connection("connection is closed".to_string())
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn query(&self, sql: &str, params: &[&str]) -> Result<QueryResult> {
        let mut statements = self.parse(sql)?;
        match statements.len() {
            0 => Ok(QueryResult::empty()),
            1 => self.run_statement(&statements.remove(0), params),
            _ => Err(DbError::database(
                "42601",
                "cannot insert multiple commands into a prepared statement",
            )),
        }
    }

    async fn execute(&self, script: &str) -> Result<QueryResult> {
        let statements = self.parse(script)?;

        // Multi-statement scripts outside a transaction block are atomic.
        let implicit = statements.len() > 1
            && statements.iter().all(|s| s.control().is_none())
            && self.begin_implicit()?;

        let mut result = QueryResult::empty();
        for statement in &statements {
            match self.run_statement(statement, &[]) {
                Ok(step) => {
                    result.rows_affected += step.rows_affected;
                    if !step.columns.is_empty() {
                        result.columns = step.columns;
                        result.rows = step.rows;
                    }
                }
                Err(err) => {
                    if implicit {
                        if let Err(cleanup) = self.end_implicit(false) {
                            debug!(session = self.id, error = %cleanup, "implicit transaction cleanup failed");
                        }
                    }
                    return Err(err);
                }
            }
        }

        if implicit {
            self.end_implicit(true)?;
        }
        Ok(result)
    }

    async fn ping(&self) -> Result<()> {
        if self.session.lock()?.closed {
            return Err(closed());
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(session = self.id, error = %e, "memory session cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (MemoryDatabase, MemoryConnection) {
        let db = MemoryDatabase::new();
        let conn = db.connect();
        conn.execute("CREATE TABLE kv (k text PRIMARY KEY, v text)")
            .await
            .unwrap();
        (db, conn)
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let (db, conn) = setup().await;

        conn.begin().await.unwrap();
        conn.query("INSERT INTO kv (k, v) VALUES ($1, $2)", &["a", "1"])
            .await
            .unwrap();
        let own = conn.query("SELECT k FROM kv", &[]).await.unwrap();
        assert_eq!(own.row_count(), 1);
        assert!(db.rows("public", "kv").unwrap().unwrap().is_empty());
        conn.rollback().await.unwrap();

        assert!(db.rows("public", "kv").unwrap().unwrap().is_empty());
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn test_commit_keeps_changes() {
        let (db, conn) = setup().await;

        conn.begin().await.unwrap();
        conn.execute("INSERT INTO kv VALUES ('a', '1')").await.unwrap();
        conn.commit().await.unwrap();

        assert_eq!(db.rows("public", "kv").unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_keeps_other_sessions_commits() {
        let (db, first) = setup().await;
        let second = db.connect();

        first.begin().await.unwrap();
        first.execute("INSERT INTO kv VALUES ('a', '1')").await.unwrap();

        second.begin().await.unwrap();
        second.execute("CREATE SCHEMA other").await.unwrap();
        second.execute("INSERT INTO kv VALUES ('b', '2')").await.unwrap();
        second.commit().await.unwrap();

        first.rollback().await.unwrap();

        assert!(db.schema_exists("other").unwrap());
        assert_eq!(
            db.rows("public", "kv").unwrap().unwrap(),
            vec![vec![Value::from("b"), Value::from("2")]]
        );
    }

    #[tokio::test]
    async fn test_commit_merges_with_concurrent_commit() {
        let (db, first) = setup().await;
        let second = db.connect();

        first.begin().await.unwrap();
        first.execute("INSERT INTO kv VALUES ('a', '1')").await.unwrap();
        second.execute("INSERT INTO kv VALUES ('b', '2')").await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(db.rows("public", "kv").unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_close_discards_open_transaction() {
        let (db, first) = setup().await;
        let second = db.connect();

        first.begin().await.unwrap();
        first.execute("INSERT INTO kv VALUES ('a', '1')").await.unwrap();
        second.execute("CREATE SCHEMA other").await.unwrap();
        first.close().unwrap();

        assert!(db.rows("public", "kv").unwrap().unwrap().is_empty());
        assert!(db.schema_exists("other").unwrap());
    }

    #[tokio::test]
    async fn test_failed_statement_aborts_transaction() {
        let (_db, conn) = setup().await;

        conn.begin().await.unwrap();
        assert!(conn.execute("SELECT * FROM missing").await.is_err());

        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert_eq!(err.code(), Some("25P02"));

        conn.rollback().await.unwrap();
        assert!(conn.execute("SELECT 1").await.is_ok());
    }

    #[tokio::test]
    async fn test_syntax_error_aborts_transaction() {
        let (_db, conn) = setup().await;

        conn.begin().await.unwrap();
        let err = conn.execute("SELEC 1").await.unwrap_err();
        assert_eq!(err.code(), Some("42601"));

        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert_eq!(err.code(), Some("25P02"));
        conn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_multi_statement_script_is_atomic() {
        let (db, conn) = setup().await;

        let err = conn
            .execute("INSERT INTO kv VALUES ('a', '1'); INSERT INTO nowhere VALUES (1);")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("42P01"));
        assert!(db.rows("public", "kv").unwrap().unwrap().is_empty());
        assert!(!conn.in_transaction());

        conn.execute("INSERT INTO kv VALUES ('a', '1'); INSERT INTO kv VALUES ('b', '2')")
            .await
            .unwrap();
        assert_eq!(db.rows("public", "kv").unwrap().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_comments_and_dollar_quotes() {
        let (db, conn) = setup().await;

        conn.execute("/* step; one */ CREATE SCHEMA app").await.unwrap();
        assert!(db.schema_exists("app").unwrap());

        conn.execute("-- seed; data\nINSERT INTO kv VALUES ('a', $body$x; y$body$);")
            .await
            .unwrap();
        assert_eq!(
            db.rows("public", "kv").unwrap().unwrap(),
            vec![vec![Value::from("a"), Value::from("x; y")]]
        );
    }

    #[tokio::test]
    async fn test_query_rejects_multiple_statements() {
        let (_db, conn) = setup().await;
        let err = conn.query("SELECT 1; SELECT 2", &[]).await.unwrap_err();
        assert_eq!(err.code(), Some("42601"));
    }

    #[tokio::test]
    async fn test_advisory_lock_contention() {
        let db = MemoryDatabase::new();
        let first = db.connect();
        let second = db.connect();
        let lock = "SELECT pg_try_advisory_lock(hashtext($1), hashtext($2)) AS locked";
        let unlock = "SELECT pg_advisory_unlock(hashtext($1), hashtext($2))";

        let granted = first.query(lock, &["versiondb", "app"]).await.unwrap();
        assert_eq!(granted.get(0, "locked"), Some(&Value::Boolean(true)));

        let denied = second.query(lock, &["versiondb", "app"]).await.unwrap();
        assert_eq!(denied.get(0, "locked"), Some(&Value::Boolean(false)));

        let released = first.query(unlock, &["versiondb", "app"]).await.unwrap();
        assert_eq!(
            released.get(0, "pg_advisory_unlock"),
            Some(&Value::Boolean(true))
        );
        assert!(!db.is_locked("versiondb", "app").unwrap());

        let granted = second.query(lock, &["versiondb", "app"]).await.unwrap();
        assert_eq!(granted.get(0, "locked"), Some(&Value::Boolean(true)));
    }

    #[tokio::test]
    async fn test_drop_releases_locks() {
        let db = MemoryDatabase::new();
        let conn = db.connect();
        conn.query(
            "SELECT pg_try_advisory_lock(hashtext($1), hashtext($2)) AS locked",
            &["versiondb", "app"],
        )
        .await
        .unwrap();
        assert!(db.is_locked("versiondb", "app").unwrap());

        drop(conn);
        assert!(!db.is_locked("versiondb", "app").unwrap());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let (db, conn) = setup().await;
        db.inject_failure("INSERT INTO kv").unwrap();

        let err = conn
            .execute("INSERT INTO kv VALUES ('a', '1')")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("XX000"));

        db.clear_failures().unwrap();
        assert!(conn.execute("INSERT INTO kv VALUES ('a', '1')").await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_transaction() {
        let (db, conn) = setup().await;
        db.inject_failure("COMMIT").unwrap();

        conn.begin().await.unwrap();
        conn.execute("INSERT INTO kv VALUES ('a', '1')").await.unwrap();
        assert_eq!(conn.commit().await.unwrap_err().code(), Some("XX000"));

        assert!(!conn.in_transaction());
        assert!(db.rows("public", "kv").unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_statements() {
        let (_db, conn) = setup().await;
        conn.close().unwrap();

        assert!(conn.ping().await.is_err());
        assert!(matches!(
            conn.execute("SELECT 1").await,
            Err(DbError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_statement_log() {
        let (_db, conn) = setup().await;
        conn.begin().await.unwrap();
        conn.rollback().await.unwrap();

        assert_eq!(
            conn.statements(),
            vec![
                "CREATE TABLE kv (k text PRIMARY KEY, v text)".to_string(),
                "BEGIN".to_string(),
                "ROLLBACK".to_string(),
            ]
        );
    }
}
