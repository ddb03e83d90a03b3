//! Task Service (C9): status transitions and listing on top of [`PlanStore`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use lifeplan_state::{PlanStore, TaskRecord, TaskStatus};

use crate::domain::error::{CoreError, Result};

/// Whether a task's completion needs an explicit decision (a branch choice)
/// or is a plain checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Normal,
    Decision,
}

/// Derived, not stored: `decision` iff `tags` contains `"decision"` or
/// `ui_actions` is non-empty.
pub fn task_kind(metadata: &Value) -> TaskKind {
    let has_decision_tag = metadata
        .get("tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some("decision")));
    let has_ui_actions = metadata
        .get("ui_actions")
        .and_then(Value::as_array)
        .is_some_and(|actions| !actions.is_empty());

    if has_decision_tag || has_ui_actions {
        TaskKind::Decision
    } else {
        TaskKind::Normal
    }
}

fn is_decision_tagged(metadata: &Value) -> bool {
    metadata
        .get("tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some("decision")))
}

pub struct TaskService {
    store: Arc<dyn PlanStore>,
}

impl TaskService {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self { store }
    }

    /// Tasks for a plan in topological (`sort_key`) order, optionally
    /// narrowed to a single status.
    pub async fn list_tasks(&self, plan_id: Uuid, status: Option<TaskStatus>) -> Result<Vec<TaskRecord>> {
        let mut tasks = self.store.list_tasks(plan_id).await?;
        if let Some(wanted) = status {
            tasks.retain(|t| t.status == wanted);
        }
        tasks.sort_by_key(|t| t.sort_key);
        Ok(tasks)
    }

    #[instrument(skip(self), fields(task_key = tracing::field::Empty))]
    pub async fn update_status(
        &self,
        plan_id: Uuid,
        task_id: Uuid,
        new_status: TaskStatus,
        force: bool,
    ) -> Result<TaskRecord> {
        let task = self.store.get_task(plan_id, task_id).await?;
        tracing::Span::current().record("task_key", tracing::field::display(&task.task_key));

        if new_status == TaskStatus::Done && task.status != TaskStatus::Done {
            if is_decision_tagged(&task.metadata) {
                tracing::warn!(task_key = %task.task_key, "decision task rejected manual completion");
                return Err(CoreError::TaskDecisionManualCompleteForbidden);
            }

            if !force {
                let unresolved = self.unresolved_hard_dependencies(plan_id, &task).await?;
                if !unresolved.is_empty() {
                    tracing::warn!(task_key = %task.task_key, ?unresolved, "task blocked by unresolved dependencies");
                    return Err(CoreError::TaskBlocked { task_key: task.task_key.clone(), unresolved });
                }
            }
        }

        let completed_at = match (task.status, new_status) {
            (TaskStatus::Done, TaskStatus::Done) => task.completed_at,
            (_, TaskStatus::Done) => Some(Utc::now()),
            (TaskStatus::Done, _) => None,
            _ => task.completed_at,
        };

        let updated = self
            .store
            .update_task_status(plan_id, task_id, new_status, completed_at)
            .await?;
        Ok(updated)
    }

    async fn unresolved_hard_dependencies(&self, plan_id: Uuid, task: &TaskRecord) -> Result<Vec<String>> {
        let block_type = task.metadata.get("block_type").and_then(Value::as_str).unwrap_or("hard");
        if block_type != "hard" {
            return Ok(Vec::new());
        }

        let blocked_by: Vec<String> = task
            .metadata
            .get("blocked_by")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if blocked_by.is_empty() {
            return Ok(Vec::new());
        }

        let siblings = self.store.list_tasks(plan_id).await?;
        let unresolved = blocked_by
            .into_iter()
            .filter(|dep_key| {
                match siblings.iter().find(|s| &s.task_key == dep_key) {
                    Some(s) => s.status != TaskStatus::Done,
                    None => true,
                }
            })
            .collect();
        Ok(unresolved)
    }
}
