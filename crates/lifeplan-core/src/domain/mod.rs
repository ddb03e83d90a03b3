//! Domain layer: the pure workflow engine (C1–C7).
//!
//! Everything here is synchronous and side-effect free except
//! [`template::FsTemplateRepository`], which touches the filesystem but not
//! the database. Persistence and orchestration live in [`crate::services`].

pub mod deadline;
pub mod error;
pub mod facts;
pub mod graph;
pub mod planner;
pub mod rule;
pub mod template;
pub mod toposort;

pub use deadline::{compute_deadline, parse_iso_date};
pub use error::{CoreError, DeadlineError, GraphValidationError, PlannerError, Result, RuleError, ToposortError};
pub use facts::normalize_facts;
pub use graph::{validate_graph, TemplateGraph};
pub use planner::{generate_plan, Plan, TaskPlanItem};
pub use rule::{eval, Op, Predicate, Rule};
pub use template::{FsTemplateRepository, TemplateRepository};
pub use toposort::toposort;
