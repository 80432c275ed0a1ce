use crate::core::{Row, Value};

/// Rows and bookkeeping returned by a connection for one statement or script.
///
/// For multi-statement scripts `columns`/`rows` describe the last statement
/// that produced a row set, and `rows_affected` sums every statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    pub fn with_rows_affected(mut self, rows_affected: u64) -> Self {
        self.rows_affected = rows_affected;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in row `row`, if both exist.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Text of `column` in the first row; `None` for no rows or SQL NULL.
    pub fn first_text(&self, column: &str) -> Option<String> {
        self.get(0, column).and_then(Value::as_str).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_column_name() {
        let result = QueryResult::new(
            vec!["product".into(), "version".into()],
            vec![vec![Value::from("example"), Value::from("1.0.0")]],
        );

        assert_eq!(result.row_count(), 1);
        assert_eq!(result.first_text("VERSION").as_deref(), Some("1.0.0"));
        assert!(result.get(1, "version").is_none());
        assert!(result.get(0, "missing").is_none());
    }

    #[test]
    fn test_null_is_not_text() {
        let result = QueryResult::new(vec!["version".into()], vec![vec![Value::Null]]);
        assert_eq!(result.first_text("version"), None);
    }
}
