use super::task::Task;
use crate::core::{DbError, ScriptProblem};
use std::collections::HashSet;

/// A named, ordered group of tasks applied in one transaction.
#[derive(Debug)]
pub struct Version {
    name: String,
    tasks: Vec<Task>,
}

impl Version {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name() == name)
    }

    /// Every task whose script cannot be resolved, in declaration order.
    pub async fn script_problems(&self) -> Vec<ScriptProblem> {
        let mut problems = Vec::new();
        for task in &self.tasks {
            if let Err(err) = task.check_script().await {
                let reason = match err {
                    DbError::ScriptLoad { reason, .. } => reason,
                    other => other.to_string(),
                };
                problems.push(ScriptProblem {
                    version: self.name.clone(),
                    task: task.name().to_string(),
                    reason,
                });
            }
        }
        problems
    }

    pub(crate) fn duplicate_task_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for task in &self.tasks {
            if !seen.insert(task.name()) && !duplicates.contains(&task.name()) {
                duplicates.push(task.name());
            }
        }
        duplicates
    }
}
