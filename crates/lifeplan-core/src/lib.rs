//! Life event planner core library.
//!
//! Houses the declarative workflow engine ([`domain`]), the plan lifecycle
//! and reminder pipeline orchestration ([`services`]), the notification
//! stack ([`notifications`]), and ambient configuration/telemetry.

pub mod config;
pub mod domain;
pub mod notifications;
pub mod services;
pub mod telemetry;

pub use config::{AppConfig, ConfigError};

pub use domain::{
    compute_deadline, eval, generate_plan, normalize_facts, parse_iso_date, toposort,
    validate_graph, CoreError, DeadlineError, FsTemplateRepository, GraphValidationError, Op,
    Plan, PlannerError, Predicate, Result, Rule, RuleError, TaskPlanItem, TemplateGraph,
    TemplateRepository, ToposortError,
};

pub use telemetry::init_tracing;

/// Crate version, exposed for diagnostics and `/healthz`-style endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
