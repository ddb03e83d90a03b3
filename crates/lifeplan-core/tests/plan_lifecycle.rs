//! End-to-end plan lifecycle: create from a compiled template on disk,
//! gate task completion on dependencies and decision tags, and recompute
//! after a fact patch while preserving completed work.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use lifeplan_core::domain::{FsTemplateRepository, TemplateRepository};
use lifeplan_core::services::{PlanService, PlanWithTasks, TaskService};
use lifeplan_state::{MemoryPlanStore, PlanStatus, TaskRecord, TaskStatus};

async fn write_template(root: &Path, event: &str, version: &str, body: &str) {
    let dir = root.join(event).join(version);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join("compiled.json"), body).await.unwrap();
}

fn birth_v1() -> String {
    json!({
        "template_id": "birth_de/v1",
        "event_date_key": "birth_date",
        "graph": {
            "nodes": ["t_birth_certificate", "t_child_benefit", "t_parental_allowance"],
            "edges": [
                {"from": "t_birth_certificate", "to": "t_child_benefit"},
                {"from": "t_birth_certificate", "to": "t_parental_allowance"}
            ]
        },
        "tasks": {
            "t_birth_certificate": {
                "title": "Geburtsurkunde beantragen",
                "category": "behoerde",
                "priority": "high",
                "tags": [],
                "deadline": {"type": "relative_days", "offset_days": 7}
            },
            "t_child_benefit": {
                "title": "Kindergeld beantragen",
                "category": "finanzen",
                "priority": "medium",
                "tags": [],
                "deadline": {"type": "relative_days", "offset_days": 30, "grace_days": 14}
            },
            "t_parental_allowance": {
                "title": "Elterngeld beantragen",
                "eligibility": {"fact": "employment_type", "op": "=", "value": "employed"},
                "category": "finanzen",
                "priority": "high",
                "tags": [],
                "deadline": {"type": "relative_days", "offset_days": 60}
            }
        }
    })
    .to_string()
}

fn birth_v2() -> String {
    json!({
        "template_id": "birth_de/v2",
        "event_date_key": "birth_date",
        "graph": {
            "nodes": [
                "t_birth_certificate",
                "t_choose_insurance",
                "t_add_child_insurance_gkv",
                "t_add_child_insurance_pkv"
            ],
            "edges": [
                {"from": "t_birth_certificate", "to": "t_add_child_insurance_gkv"},
                {"from": "t_birth_certificate", "to": "t_add_child_insurance_pkv"}
            ]
        },
        "tasks": {
            "t_birth_certificate": {
                "title": "Geburtsurkunde beantragen",
                "tags": [],
                "deadline": {"type": "relative_days", "offset_days": 7}
            },
            "t_choose_insurance": {
                "title": "Krankenversicherung des Kindes wählen",
                "eligibility": {"fact": "child_insurance_kind", "op": "=", "value": "unknown"},
                "tags": ["decision"],
                "deadline": {"type": "relative_days", "offset_days": 14}
            },
            "t_add_child_insurance_gkv": {
                "title": "Kind in der GKV anmelden",
                "eligibility": {"fact": "child_insurance_kind", "op": "=", "value": "gkv"},
                "tags": [],
                "deadline": {"type": "relative_days", "offset_days": 30}
            },
            "t_add_child_insurance_pkv": {
                "title": "Kind in der PKV anmelden",
                "eligibility": {"fact": "child_insurance_kind", "op": "=", "value": "pkv"},
                "tags": [],
                "deadline": {"type": "relative_days", "offset_days": 30}
            }
        }
    })
    .to_string()
}

async fn setup() -> (PlanService, TaskService, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "birth_de", "v1", &birth_v1()).await;
    write_template(dir.path(), "birth_de", "v2", &birth_v2()).await;

    let templates: Arc<dyn TemplateRepository> = Arc::new(FsTemplateRepository::new(dir.path()));
    let store = Arc::new(MemoryPlanStore::new());
    let plans = PlanService::new(templates, store.clone());
    let tasks = TaskService::new(store);
    (plans, tasks, dir)
}

fn by_key<'a>(result: &'a PlanWithTasks, key: &str) -> &'a TaskRecord {
    result
        .tasks
        .iter()
        .find(|t| t.task_key == key)
        .unwrap_or_else(|| panic!("task {key} not in plan"))
}

#[tokio::test]
async fn create_birth_plan_materializes_ordered_dated_tasks() {
    let (plans, _tasks, _dir) = setup().await;
    let result = plans
        .create(
            "birth_de/v1",
            json!({
                "birth_date": "2026-04-01",
                "employment_type": "employed",
                "public_insurance": true,
                "private_insurance": false
            }),
        )
        .await
        .unwrap();

    assert_eq!(result.plan.status, PlanStatus::Active);
    assert!(!result.tasks.is_empty());

    let cert = by_key(&result, "t_birth_certificate");
    assert_eq!(cert.due_date.unwrap().to_string(), "2026-04-08");
    let benefit = by_key(&result, "t_child_benefit");
    // offset 30 + grace 14
    assert_eq!(benefit.due_date.unwrap().to_string(), "2026-05-15");
    assert!(cert.sort_key < benefit.sort_key);
    assert_eq!(benefit.metadata["blocked_by"], json!(["t_birth_certificate"]));

    // employed → parental allowance is active
    by_key(&result, "t_parental_allowance");
}

#[tokio::test]
async fn unemployed_facts_prune_the_parental_allowance_task() {
    let (plans, _tasks, _dir) = setup().await;
    let result = plans
        .create(
            "birth_de/v1",
            json!({"birth_date": "2026-04-01", "employment_type": "self_employed"}),
        )
        .await
        .unwrap();
    assert!(!result.tasks.iter().any(|t| t.task_key == "t_parental_allowance"));
}

#[tokio::test]
async fn unknown_template_key_is_template_not_found() {
    let (plans, _tasks, _dir) = setup().await;
    let err = plans.create("adoption_de/v1", json!({})).await.unwrap_err();
    assert_eq!(err.code(), "TEMPLATE_NOT_FOUND");
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn missing_anchor_fact_is_planner_input_invalid() {
    let (plans, _tasks, _dir) = setup().await;
    let err = plans.create("birth_de/v1", json!({"employment_type": "employed"})).await.unwrap_err();
    assert_eq!(err.code(), "PLANNER_INPUT_INVALID");
    assert_eq!(err.status(), 400);
}

#[tokio::test]
async fn blocked_task_completes_only_with_force() {
    let (plans, tasks, _dir) = setup().await;
    let result = plans
        .create(
            "birth_de/v1",
            json!({"birth_date": "2026-04-01", "employment_type": "employed"}),
        )
        .await
        .unwrap();

    let benefit = by_key(&result, "t_child_benefit");
    let err = tasks
        .update_status(result.plan.id, benefit.id, TaskStatus::Done, false)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TASK_BLOCKED");
    assert_eq!(err.status(), 409);

    let forced = tasks
        .update_status(result.plan.id, benefit.id, TaskStatus::Done, true)
        .await
        .unwrap();
    assert_eq!(forced.status, TaskStatus::Done);
    assert!(forced.completed_at.is_some());
}

#[tokio::test]
async fn decision_task_rejects_manual_completion_even_with_force() {
    let (plans, tasks, _dir) = setup().await;
    let result = plans
        .create(
            "birth_de/v2",
            json!({
                "birth_date": "2026-04-01",
                "public_insurance": true,
                "private_insurance": true
            }),
        )
        .await
        .unwrap();

    // Both insurance flags set → kind normalizes to "unknown" → decision task active.
    assert_eq!(result.plan.facts["child_insurance_kind"], "unknown");
    let decision = by_key(&result, "t_choose_insurance");

    let err = tasks
        .update_status(result.plan.id, decision.id, TaskStatus::Done, true)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "TASK_DECISION_MANUAL_COMPLETE_FORBIDDEN");
    assert_eq!(err.status(), 409);
}

#[tokio::test]
async fn recompute_after_fact_patch_swaps_tasks_and_preserves_done() {
    let (plans, tasks, _dir) = setup().await;
    let created = plans
        .create(
            "birth_de/v2",
            json!({
                "birth_date": "2026-04-01",
                "public_insurance": true,
                "private_insurance": true
            }),
        )
        .await
        .unwrap();
    assert!(created.tasks.iter().any(|t| t.task_key == "t_choose_insurance"));
    assert!(!created.tasks.iter().any(|t| t.task_key == "t_add_child_insurance_gkv"));

    let cert = by_key(&created, "t_birth_certificate");
    let done = tasks
        .update_status(created.plan.id, cert.id, TaskStatus::Done, false)
        .await
        .unwrap();
    let completed_at = done.completed_at.unwrap();

    let recomputed = plans
        .update_facts(created.plan.id, json!({"child_insurance_kind": "gkv"}), true)
        .await
        .unwrap();

    assert!(!recomputed.tasks.iter().any(|t| t.task_key == "t_choose_insurance"));
    by_key(&recomputed, "t_add_child_insurance_gkv");

    let cert_after = by_key(&recomputed, "t_birth_certificate");
    assert_eq!(cert_after.status, TaskStatus::Done);
    assert_eq!(cert_after.completed_at, Some(completed_at));

    // Tasks other than the restored one come back fresh.
    let gkv = by_key(&recomputed, "t_add_child_insurance_gkv");
    assert_eq!(gkv.status, TaskStatus::Todo);
    assert!(gkv.completed_at.is_none());
}
