//! Domain-level error taxonomy.
//!
//! Two layers: narrow errors raised deep in the engine (`PlannerError`,
//! `GraphValidationError`) and the outward `CoreError` that services remap
//! them into at the boundary, carrying the machine-readable `code` the HTTP
//! layer maps to a status.

use thiserror::Error;

/// Errors raised while evaluating an eligibility rule tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("eligibility cannot be null")]
    NullRule,
    #[error("rule must be an object")]
    NotAnObject,
    #[error("rule.all must be a list")]
    AllNotAList,
    #[error("rule.any must be a list")]
    AnyNotAList,
    #[error("invalid predicate shape: {0}")]
    InvalidPredicate(String),
    #[error("unsupported predicate op: {0}")]
    UnsupportedOp(String),
}

/// Errors raised while computing a deadline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeadlineError {
    #[error("event_date must be an ISO date string (YYYY-MM-DD)")]
    InvalidEventDate,
    #[error("offset_days must be int")]
    OffsetNotInt,
    #[error("grace_days must be int")]
    GraceNotInt,
}

/// Errors raised validating a template's structural invariants (C3).
///
/// Message prefixes are part of the contract callers match on:
/// "Duplicate node ids", "Node missing in tasks", "Task missing in
/// graph.nodes", "unknown node", "Cycle detected".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("'{0}' must be a list")]
    NotAList(String),
    #[error("'{0}' must be an object")]
    NotAnObject(String),
    #[error("all graph.nodes entries must be strings")]
    NonStringNode,
    #[error("Duplicate node ids in graph.nodes")]
    DuplicateNodeIds,
    #[error("{0}")]
    NodeTaskMismatch(String),
    #[error("graph.edges[{0}] must contain string 'from' and 'to'")]
    MalformedEdge(usize),
    #[error("Edge references unknown node: {from:?} -> {to:?}")]
    UnknownNode { from: String, to: String },
    #[error("Cycle detected: affected nodes {0:?}")]
    CycleDetected(Vec<String>),
}

/// Errors raised while topologically sorting the active task subgraph (C4).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToposortError {
    #[error("dependency references unknown active task")]
    UnknownActiveTask,
    #[error("Cycle detected in active task graph")]
    Cycle,
}

/// Planner-facing errors (C5), mirroring the narrower errors they wrap.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("{0}")]
    Input(String),
    #[error("dependency references unknown workflow task id")]
    Dependency,
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Deadline(#[from] DeadlineError),
    #[error(transparent)]
    Toposort(#[from] ToposortError),
}

/// Outward error taxonomy the service layer surfaces.
///
/// Each variant corresponds to one row of the error table: code + status.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Template '{0}' not found")]
    TemplateNotFound(String),

    #[error("Plan '{0}' not found")]
    PlanNotFound(String),

    #[error("Task '{task_id}' not found for plan '{plan_id}'")]
    TaskNotFound { plan_id: String, task_id: String },

    #[error("{0}")]
    PlannerInputInvalid(String),

    #[error("Task '{task_key}' is blocked by unresolved dependencies: {}", .unresolved.join(", "))]
    TaskBlocked {
        task_key: String,
        unresolved: Vec<String>,
    },

    #[error("Decision-Task kann nicht manuell abgeschlossen werden; bitte Auswahl treffen.")]
    TaskDecisionManualCompleteForbidden,

    #[error("{0}")]
    RequestValidation(String),

    #[error("{0}")]
    Persistence(String),
}

impl CoreError {
    /// The machine-readable error code the HTTP layer maps to a status.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            CoreError::PlanNotFound(_) => "PLAN_NOT_FOUND",
            CoreError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            CoreError::PlannerInputInvalid(_) => "PLANNER_INPUT_INVALID",
            CoreError::TaskBlocked { .. } => "TASK_BLOCKED",
            CoreError::TaskDecisionManualCompleteForbidden => {
                "TASK_DECISION_MANUAL_COMPLETE_FORBIDDEN"
            }
            CoreError::RequestValidation(_) => "REQUEST_VALIDATION_ERROR",
            CoreError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// The HTTP-status-equivalent this error maps to outward.
    pub fn status(&self) -> u16 {
        match self {
            CoreError::TemplateNotFound(_)
            | CoreError::PlanNotFound(_)
            | CoreError::TaskNotFound { .. } => 404,
            CoreError::PlannerInputInvalid(_) => 400,
            CoreError::TaskBlocked { .. } | CoreError::TaskDecisionManualCompleteForbidden => 409,
            CoreError::RequestValidation(_) => 422,
            CoreError::Persistence(_) => 500,
        }
    }
}

impl From<PlannerError> for CoreError {
    fn from(err: PlannerError) -> Self {
        CoreError::PlannerInputInvalid(err.to_string())
    }
}

impl From<GraphValidationError> for CoreError {
    fn from(err: GraphValidationError) -> Self {
        CoreError::PlannerInputInvalid(err.to_string())
    }
}

impl From<lifeplan_state::StateError> for CoreError {
    fn from(err: lifeplan_state::StateError) -> Self {
        CoreError::Persistence(err.to_string())
    }
}

impl From<lifeplan_state::StorageError> for CoreError {
    fn from(err: lifeplan_state::StorageError) -> Self {
        match err {
            lifeplan_state::StorageError::PlanNotFound(id) => CoreError::PlanNotFound(id),
            lifeplan_state::StorageError::TaskNotFound { plan_id, task_id } => {
                CoreError::TaskNotFound { plan_id, task_id }
            }
            other => CoreError::Persistence(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_status_line_up_with_the_error_table() {
        assert_eq!(CoreError::TemplateNotFound("x".into()).code(), "TEMPLATE_NOT_FOUND");
        assert_eq!(CoreError::TemplateNotFound("x".into()).status(), 404);
        assert_eq!(
            CoreError::TaskDecisionManualCompleteForbidden.status(),
            409
        );
        assert_eq!(CoreError::Persistence("boom".into()).status(), 500);
    }

    #[test]
    fn planner_error_remaps_to_planner_input_invalid() {
        let err: CoreError = PlannerError::Input("bad".into()).into();
        assert_eq!(err.code(), "PLANNER_INPUT_INVALID");
    }
}
