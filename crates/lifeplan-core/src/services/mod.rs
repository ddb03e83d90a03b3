//! Application services: the orchestration layer between the pure domain
//! engine (`crate::domain`) and persistence (`lifeplan_state`).

pub mod dispatcher;
pub mod plan_service;
pub mod profile_service;
pub mod scanner;
pub mod task_service;

pub use dispatcher::{DispatchSummary, OutboxDispatcher};
pub use plan_service::{PlanService, PlanWithTasks, ENGINE_VERSION};
pub use profile_service::{is_sendable, ProfileService};
pub use scanner::{ReminderScanner, ScanSummary};
pub use task_service::{task_kind, TaskKind, TaskService};
