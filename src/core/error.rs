use std::fmt;
use thiserror::Error;

/// A single task whose script could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptProblem {
    pub version: String,
    pub task: String,
    pub reason: String,
}

impl fmt::Display for ScriptProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}: {}", self.version, self.task, self.reason)
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {message}")]
    Database {
        code: Option<String>,
        message: String,
    },

    #[error("Failed to initialize version store: {0}")]
    StoreInit(#[source] Box<DbError>),

    #[error("Invalid manifest: {}", .0.join("; "))]
    InvalidManifest(Vec<String>),

    #[error("Unreadable scripts: {}", join_problems(.0))]
    UnreadableScripts(Vec<ScriptProblem>),

    #[error("Script for task '{task}' could not be loaded: {reason}")]
    ScriptLoad { task: String, reason: String },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Product '{0}' is locked by another upgrade run")]
    Locked(String),

    #[error("Failed to {action} transaction: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: Box<DbError>,
    },

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl DbError {
    /// Shorthand for a statement-level failure reported by the store.
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// A BEGIN or COMMIT that failed.
    pub fn transaction(action: &'static str, source: DbError) -> Self {
        Self::Transaction {
            action,
            source: Box::new(source),
        }
    }

    /// SQLSTATE code, when the backend reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            Self::StoreInit(inner) | Self::Transaction { source: inner, .. } => inner.code(),
            _ => None,
        }
    }
}

fn join_problems(problems: &[ScriptProblem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Connection(format!("poisoned lock: {}", err))
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreadable_scripts_lists_every_task() {
        let err = DbError::UnreadableScripts(vec![
            ScriptProblem {
                version: "1.0.0".into(),
                task: "first".into(),
                reason: "missing".into(),
            },
            ScriptProblem {
                version: "1.0.1".into(),
                task: "second".into(),
                reason: "denied".into(),
            },
        ]);

        let message = err.to_string();
        assert!(message.contains("1.0.0 / first: missing"));
        assert!(message.contains("1.0.1 / second: denied"));
    }

    #[test]
    fn test_code_looks_through_store_init() {
        let err = DbError::StoreInit(Box::new(DbError::database("42501", "permission denied")));
        assert_eq!(err.code(), Some("42501"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_transaction_error_names_the_action() {
        let err = DbError::transaction("commit", DbError::database("40001", "serialization failure"));
        assert_eq!(err.code(), Some("40001"));
        assert_eq!(
            err.to_string(),
            "Failed to commit transaction: Database error: serialization failure"
        );
    }
}
