//! Notification stack: send-window arithmetic, dedupe keys, email rendering,
//! and the provider adapter (C14–C15).

pub mod dedupe;
pub mod provider;
pub mod templates;
pub mod time;

pub use dedupe::build_due_soon_dedupe_key_raw;
pub use provider::{BrevoEmailProvider, EmailProvider, FailureClass, ProviderSendResult, SendStatus};
pub use templates::{render_task_due_soon, RenderedEmail};
pub use time::{
    due_soon_window, is_within_send_window, local_day_utc_bounds, local_today,
    next_send_window_start, now_utc,
};
