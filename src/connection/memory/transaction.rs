use super::catalog::{Catalog, Table, TableKey};
use crate::core::{Result, Row};
use crate::result::QueryResult;
use sqlparser::ast as sql_ast;
use std::sync::Mutex;

/// One effect of a statement, recorded while a transaction runs.
///
/// COMMIT replays the journal onto whatever the shared catalog holds by
/// then; ROLLBACK just drops it.
#[derive(Debug, Clone)]
pub(crate) enum Change {
    CreateSchema(String),
    /// Drops the schema's tables with it.
    DropSchema(String),
    CreateTable { key: TableKey, table: Table },
    DropTable(TableKey),
    InsertRow { key: TableKey, row: Row },
    UpdateRow { key: TableKey, old: Row, new: Row },
    DeleteRow { key: TableKey, row: Row },
}

/// A session's private view of the database between BEGIN and COMMIT.
///
/// Statements run against `working`, a copy taken at BEGIN, so other
/// sessions never see uncommitted state and this session never sees theirs.
pub(crate) struct Transaction {
    working: Catalog,
    changes: Vec<Change>,
    aborted: bool,
}

impl Transaction {
    pub fn begin(snapshot: Catalog) -> Self {
        Self {
            working: snapshot,
            changes: Vec::new(),
            aborted: false,
        }
    }

    pub fn execute(&mut self, statement: &sql_ast::Statement, params: &[&str]) -> Result<QueryResult> {
        self.working.execute(statement, params, &mut self.changes)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// After a failed statement only ROLLBACK (or COMMIT, which rolls back) is accepted.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Replays the journal onto the shared catalog. All or nothing: on a
    /// conflict the shared catalog is left untouched.
    pub fn publish(self, shared: &Mutex<Catalog>) -> Result<usize> {
        if self.changes.is_empty() {
            return Ok(0);
        }

        let mut catalog = shared.lock()?;
        let mut next = catalog.clone();
        for change in &self.changes {
            next.apply(change)?;
        }
        *catalog = next;
        Ok(self.changes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::{StatementKind, parse_script};
    use super::*;
    use crate::core::Value;

    fn run(tx: &mut Transaction, sql: &str) -> Result<QueryResult> {
        let mut result = QueryResult::empty();
        for statement in parse_script(sql)? {
            let StatementKind::Sql(statement) = statement.kind else {
                panic!("unexpected control statement in {}", sql);
            };
            result = tx.execute(&statement, &[])?;
        }
        Ok(result)
    }

    fn shared_with_table() -> Mutex<Catalog> {
        let mut setup = Transaction::begin(Catalog::new());
        run(&mut setup, "CREATE TABLE kv (k text PRIMARY KEY, v text)").unwrap();
        let shared = Mutex::new(Catalog::new());
        setup.publish(&shared).unwrap();
        shared
    }

    #[test]
    fn test_concurrent_inserts_both_commit() {
        let shared = shared_with_table();

        let mut first = Transaction::begin(shared.lock().unwrap().clone());
        let mut second = Transaction::begin(shared.lock().unwrap().clone());
        run(&mut first, "INSERT INTO kv VALUES ('a', '1')").unwrap();
        run(&mut second, "INSERT INTO kv VALUES ('b', '2')").unwrap();

        assert_eq!(first.publish(&shared).unwrap(), 1);
        assert_eq!(second.publish(&shared).unwrap(), 1);
        assert_eq!(shared.lock().unwrap().rows("public", "kv").unwrap().len(), 2);
    }

    #[test]
    fn test_conflicting_update_is_rejected_whole() {
        let shared = shared_with_table();
        let mut setup = Transaction::begin(shared.lock().unwrap().clone());
        run(&mut setup, "INSERT INTO kv VALUES ('a', '1')").unwrap();
        setup.publish(&shared).unwrap();

        let mut first = Transaction::begin(shared.lock().unwrap().clone());
        let mut second = Transaction::begin(shared.lock().unwrap().clone());
        run(&mut first, "UPDATE kv SET v = 'first' WHERE k = 'a'").unwrap();
        run(&mut second, "INSERT INTO kv VALUES ('b', '2'); UPDATE kv SET v = 'second' WHERE k = 'a'")
            .unwrap();
        assert_eq!(second.changes.len(), 2);

        first.publish(&shared).unwrap();
        let err = second.publish(&shared).unwrap_err();
        assert_eq!(err.code(), Some("40001"));

        let rows = shared.lock().unwrap().rows("public", "kv").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], Value::from("first"));
    }

    #[test]
    fn test_dropped_transaction_leaves_shared_catalog_alone() {
        let shared = shared_with_table();
        let mut tx = Transaction::begin(shared.lock().unwrap().clone());
        run(&mut tx, "CREATE SCHEMA scratch; DROP TABLE kv").unwrap();
        drop(tx);

        let catalog = shared.lock().unwrap();
        assert!(!catalog.has_schema("scratch"));
        assert!(catalog.has_table("public", "kv"));
    }
}
