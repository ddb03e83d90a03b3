//! Planner engine (C5): orchestrates C1–C4 into an ordered, deterministic
//! plan artefact.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::deadline::{compute_deadline, parse_iso_date};
use super::error::PlannerError as Error;
use super::rule::{eval, Rule};
use super::toposort::toposort;

/// A single planned task, in the order the planner emits it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskPlanItem {
    pub id: String,
    pub title: String,
    pub relative_days: i64,
    pub deadline: String,
    pub depends_on: Vec<String>,
    pub meta: Value,
}

/// The full output of [`generate_plan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub workflow_id: String,
    pub event_date: String,
    pub tasks: Vec<TaskPlanItem>,
}

/// Generate a deterministic plan from a raw template and user-supplied facts.
///
/// For fixed `(workflow, facts)` the output is byte-stable across calls.
pub fn generate_plan(workflow: &Value, facts: &Value) -> Result<Plan, Error> {
    let workflow_id = read_str(workflow, "template_id", "workflow")?;
    let event_date_key = read_str(workflow, "event_date_key", "workflow")?;
    let tasks_by_id = read_tasks(workflow)?;
    let facts_map = facts
        .as_object()
        .ok_or_else(|| Error::Input("facts must be an object".into()))?;

    let event_date_raw = facts_map
        .get(&event_date_key)
        .ok_or_else(|| Error::Input(format!("missing event date fact '{event_date_key}'")))?;
    let event_date_str = event_date_raw
        .as_str()
        .ok_or_else(|| Error::Input(format!("missing event date fact '{event_date_key}'")))?;
    let event_date = parse_iso_date(event_date_str)?;

    let known_ids: HashSet<String> = tasks_by_id.keys().cloned().collect();
    let edges = read_edges(workflow, &known_ids)?;

    let mut sorted_ids: Vec<&String> = tasks_by_id.keys().collect();
    sorted_ids.sort();

    let mut active_task_ids: HashSet<String> = HashSet::new();
    for task_id in sorted_ids {
        let task = &tasks_by_id[task_id];
        let eligibility = task.get("eligibility").cloned().unwrap_or_else(|| {
            serde_json::json!({"all": []})
        });
        let rule = Rule::from_value(&eligibility)?;
        if eval(&rule, facts_map) {
            active_task_ids.insert(task_id.clone());
        }
    }

    let mut depends_on_map: HashMap<String, Vec<String>> =
        active_task_ids.iter().map(|id| (id.clone(), Vec::new())).collect();
    let mut active_edges: Vec<(String, String)> = Vec::new();

    for (source, target) in &edges {
        if !active_task_ids.contains(target) {
            continue;
        }
        if active_task_ids.contains(source) {
            depends_on_map.get_mut(target).unwrap().push(source.clone());
            active_edges.push((source.clone(), target.clone()));
        }
    }
    for deps in depends_on_map.values_mut() {
        deps.sort();
    }

    let ordered_ids = toposort(&active_task_ids, &active_edges)?;

    let mut items_by_id: HashMap<String, TaskPlanItem> = HashMap::new();
    for task_id in &active_task_ids {
        let task = &tasks_by_id[task_id];
        let title = read_str(task, "title", &format!("tasks.{task_id}"))?;
        let deadline_def = task
            .get("deadline")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Input(format!("tasks.{task_id}.deadline must be an object")))?;

        let deadline_type = deadline_def.get("type").and_then(Value::as_str);
        if deadline_type != Some("relative_days") {
            return Err(Error::Input(format!(
                "tasks.{task_id}.deadline.type must be 'relative_days'"
            )));
        }

        let offset_days = deadline_def
            .get("offset_days")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Input(format!("tasks.{task_id}.deadline.offset_days must be int")))?;
        let grace_days = match deadline_def.get("grace_days") {
            None => 0,
            Some(v) => v
                .as_i64()
                .ok_or_else(|| Error::Input(format!("tasks.{task_id}.deadline.grace_days must be int")))?,
        };

        let due_date = compute_deadline(event_date, offset_days, grace_days);

        items_by_id.insert(
            task_id.clone(),
            TaskPlanItem {
                id: task_id.clone(),
                title,
                relative_days: offset_days,
                deadline: due_date.format("%Y-%m-%d").to_string(),
                depends_on: depends_on_map.remove(task_id).unwrap_or_default(),
                meta: Value::Object(Default::default()),
            },
        );
    }

    let tasks = ordered_ids
        .into_iter()
        .map(|id| items_by_id.remove(&id).expect("ordered id must be planned"))
        .collect();

    Ok(Plan {
        workflow_id,
        event_date: event_date.format("%Y-%m-%d").to_string(),
        tasks,
    })
}

fn read_tasks(workflow: &Value) -> Result<HashMap<String, Value>, Error> {
    let raw = workflow
        .get("tasks")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Input("workflow.tasks must be an object".into()))?;
    Ok(raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn read_edges(workflow: &Value, known_ids: &HashSet<String>) -> Result<Vec<(String, String)>, Error> {
    let graph = workflow
        .get("graph")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Input("workflow.graph must be an object".into()))?;
    let raw_edges = match graph.get("edges") {
        None => return Ok(Vec::new()),
        Some(v) => v
            .as_array()
            .ok_or_else(|| Error::Input("workflow.graph.edges must be a list".into()))?,
    };

    let mut parsed = Vec::with_capacity(raw_edges.len());
    for (idx, raw_edge) in raw_edges.iter().enumerate() {
        let obj = raw_edge
            .as_object()
            .ok_or_else(|| Error::Input(format!("workflow.graph.edges[{idx}] must be an object")))?;
        let source = obj.get("from").and_then(Value::as_str);
        let target = obj.get("to").and_then(Value::as_str);
        let (source, target) = match (source, target) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                return Err(Error::Input(format!(
                    "workflow.graph.edges[{idx}] must contain string 'from' and 'to'"
                )))
            }
        };
        if !known_ids.contains(source) || !known_ids.contains(target) {
            return Err(Error::Dependency);
        }
        parsed.push((source.to_string(), target.to_string()));
    }
    Ok(parsed)
}

fn read_str(payload: &Value, key: &str, context: &str) -> Result<String, Error> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Input(format!("{context}.{key} must be a string")))
}
