use crate::core::DbError;
use crate::interface::Connection;
use crate::manifest::Task;
use crate::result::QueryResult;

/// What happened when a single task ran.
#[derive(Debug)]
pub enum TaskOutcome {
    Success {
        script: String,
        result: QueryResult,
    },
    /// `script` is `None` when the script itself could not be loaded.
    Failure {
        script: Option<String>,
        error: DbError,
    },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn script(&self) -> Option<&str> {
        match self {
            Self::Success { script, .. } => Some(script),
            Self::Failure { script, .. } => script.as_deref(),
        }
    }
}

/// Runs tasks on whatever transaction is open on the connection.
pub struct TaskRunner<'c> {
    conn: &'c dyn Connection,
}

impl<'c> TaskRunner<'c> {
    pub fn new(conn: &'c dyn Connection) -> Self {
        Self { conn }
    }

    /// Load the task's script and submit it as one unit.
    pub async fn run(&self, task: &Task) -> TaskOutcome {
        let script = match task.load_script().await {
            Ok(script) => script,
            Err(error) => return TaskOutcome::Failure { script: None, error },
        };

        match self.conn.execute(&script).await {
            Ok(result) => TaskOutcome::Success { script, result },
            Err(error) => TaskOutcome::Failure {
                script: Some(script),
                error,
            },
        }
    }
}
