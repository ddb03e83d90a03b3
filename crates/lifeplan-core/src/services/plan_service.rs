//! Plan Service (C8): owns the plan lifecycle — create, fact patches,
//! recompute — on top of [`PlanStore`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use lifeplan_state::{NewTask, PlanRecord, PlanStore, TaskRecord, TaskStatus};

use crate::domain::error::{CoreError, Result};
use crate::domain::{generate_plan, normalize_facts, TemplateRepository};

/// Version stamp recorded in every plan snapshot; bump when the planner's
/// output semantics change.
pub const ENGINE_VERSION: &str = "0.1.0";

/// A plan together with the tasks the planner materialized for it.
#[derive(Debug)]
pub struct PlanWithTasks {
    pub plan: PlanRecord,
    pub tasks: Vec<TaskRecord>,
}

pub struct PlanService {
    templates: Arc<dyn TemplateRepository>,
    store: Arc<dyn PlanStore>,
}

impl PlanService {
    pub fn new(templates: Arc<dyn TemplateRepository>, store: Arc<dyn PlanStore>) -> Self {
        Self { templates, store }
    }

    #[instrument(skip(self, facts))]
    pub async fn create(&self, template_key: &str, facts: Value) -> Result<PlanWithTasks> {
        let workflow = self.templates.load(template_key).await?;
        let normalized_facts = normalize_facts(template_key, &facts);
        let generated = generate_plan(&workflow, &normalized_facts)?;
        let snapshot = build_snapshot(template_key, &workflow, &generated)?;

        let new_tasks = build_new_tasks(&workflow, &generated.tasks, None);
        let task_count = new_tasks.len();
        let (plan, tasks) = self
            .store
            .create_plan(template_key, normalized_facts, snapshot, new_tasks)
            .await?;
        tracing::info!(plan_id = %plan.id, task_count, "plan created");
        Ok(PlanWithTasks { plan, tasks })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, plan_id: Uuid) -> Result<PlanWithTasks> {
        let plan = self.store.get_plan(plan_id).await?;
        let tasks = self.store.list_tasks(plan_id).await?;
        Ok(PlanWithTasks { plan, tasks })
    }

    /// Shallow-merge `patch` into the plan's facts, re-normalize, and
    /// optionally recompute the task set.
    #[instrument(skip(self, patch))]
    pub async fn update_facts(&self, plan_id: Uuid, patch: Value, recompute: bool) -> Result<PlanWithTasks> {
        let existing = self.store.get_plan(plan_id).await?;
        let merged = shallow_merge(&existing.facts, &patch);
        let normalized = normalize_facts(&existing.template_key, &merged);

        if !recompute {
            let plan = self.store.update_facts(plan_id, normalized).await?;
            let tasks = self.store.list_tasks(plan_id).await?;
            return Ok(PlanWithTasks { plan, tasks });
        }

        self.recompute_with_facts(plan_id, normalized).await
    }

    /// Re-run the planner against the plan's current facts, preserving
    /// `completed_at` for tasks whose `task_key` survives in the new plan.
    #[instrument(skip(self))]
    pub async fn recompute(&self, plan_id: Uuid) -> Result<PlanWithTasks> {
        let existing = self.store.get_plan(plan_id).await?;
        self.recompute_with_facts(plan_id, existing.facts).await
    }

    async fn recompute_with_facts(&self, plan_id: Uuid, facts: Value) -> Result<PlanWithTasks> {
        let existing = self.store.get_plan(plan_id).await?;
        let workflow = self.templates.load(&existing.template_key).await?;
        let generated = generate_plan(&workflow, &facts)?;
        let snapshot = build_snapshot(&existing.template_key, &workflow, &generated)?;

        let prior_tasks = self.store.list_tasks(plan_id).await?;
        let mut completed: HashMap<String, chrono::DateTime<chrono::Utc>> = HashMap::new();
        for t in &prior_tasks {
            if t.status == TaskStatus::Done {
                if let Some(at) = t.completed_at {
                    completed.insert(t.task_key.clone(), at);
                }
            }
        }

        let new_tasks = build_new_tasks(&workflow, &generated.tasks, Some(&completed));
        let (plan, tasks) = self
            .store
            .replace_plan_and_tasks(plan_id, facts, snapshot, new_tasks)
            .await?;
        tracing::info!(plan_id = %plan.id, preserved_done = completed.len(), "plan recomputed");
        Ok(PlanWithTasks { plan, tasks })
    }
}

fn build_snapshot(template_key: &str, workflow: &Value, generated: &crate::domain::Plan) -> Result<Value> {
    let planner_plan =
        serde_json::to_value(generated).map_err(|e| CoreError::PlannerInputInvalid(e.to_string()))?;
    Ok(json!({
        "planner_plan": planner_plan,
        "template_meta": {
            "template_key": template_key,
            "template_id": workflow.get("template_id").cloned().unwrap_or(Value::Null),
            "version": workflow.get("version").cloned().unwrap_or(Value::Null),
            "locale": workflow.get("locale").cloned().unwrap_or(Value::Null),
            "event_type": workflow.get("event_type").cloned().unwrap_or(Value::Null),
        },
        "engine_version": ENGINE_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "task_count": generated.tasks.len(),
    }))
}

fn shallow_merge(base: &Value, patch: &Value) -> Value {
    let mut out = base.as_object().cloned().unwrap_or_default();
    if let Some(patch_obj) = patch.as_object() {
        for (k, v) in patch_obj {
            out.insert(k.clone(), v.clone());
        }
    }
    Value::Object(out)
}

fn build_new_tasks(
    workflow: &Value,
    items: &[crate::domain::TaskPlanItem],
    completed: Option<&HashMap<String, chrono::DateTime<chrono::Utc>>>,
) -> Vec<NewTask> {
    let raw_tasks = workflow.get("tasks").and_then(Value::as_object);

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let raw = raw_tasks.and_then(|m| m.get(&item.id));
            let category = raw.and_then(|r| r.get("category")).cloned().unwrap_or(Value::Null);
            let priority = raw.and_then(|r| r.get("priority")).cloned().unwrap_or(Value::Null);
            let tags = raw
                .and_then(|r| r.get("tags"))
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));

            let metadata = json!({
                "category": category,
                "priority": priority,
                "tags": tags,
                "blocked_by": item.depends_on,
                "block_type": "hard",
            });

            let due_date = NaiveDate::parse_from_str(&item.deadline, "%Y-%m-%d").ok();
            let restore_done_at = completed.and_then(|c| c.get(&item.id)).copied();

            NewTask {
                task_key: item.id.clone(),
                title: item.title.clone(),
                description: None,
                due_date,
                metadata,
                sort_key: idx as i64,
                restore_done_at,
            }
        })
        .collect()
}
