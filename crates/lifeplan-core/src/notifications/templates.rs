//! Due-soon reminder email rendering.
//!
//! Renders the scanner's outbox payload into German-language subject/body
//! text, grouped by how many days out each task falls.

use chrono::NaiveDate;
use serde_json::Value;

const BUCKETS: [&str; 5] = ["heute", "morgen", "in 2 Tagen", "in 3 Tagen", "später"];
const MAX_PER_BUCKET: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub short_text: String,
}

pub fn render_task_due_soon(payload: &Value) -> RenderedEmail {
    let tasks: Vec<&Value> = payload
        .get("tasks")
        .and_then(Value::as_array)
        .map(|a| a.iter().collect())
        .unwrap_or_default();

    let mut grouped: [Vec<&Value>; 5] = Default::default();
    for task in &tasks {
        let due_in_days = task.get("due_in_days").and_then(Value::as_i64).unwrap_or(99);
        let bucket = match due_in_days {
            d if d <= 0 => 0,
            1 => 1,
            2 => 2,
            3 => 3,
            _ => 4,
        };
        grouped[bucket].push(task);
    }

    let total = tasks.len();
    let subject = if total == 1 {
        "1 Aufgabe bald fällig".to_string()
    } else {
        format!("{total} Aufgaben bald fällig")
    };

    let greeting_name = payload.get("user_display_name").and_then(Value::as_str);
    let greeting = match greeting_name {
        Some(name) if !name.is_empty() => format!("Hallo {name},"),
        _ => "Hallo,".to_string(),
    };

    let plan_url = payload.get("plan_url").and_then(Value::as_str).unwrap_or("");
    let settings_url = payload.get("settings_url").and_then(Value::as_str).unwrap_or("");
    let unsubscribe_url = payload.get("unsubscribe_url").and_then(Value::as_str).unwrap_or("");

    let mut text_lines = vec![greeting.clone(), String::new(), "die folgenden Aufgaben stehen bald an:".to_string(), String::new()];
    let mut html_lines = vec![
        format!("<p>{greeting}</p>"),
        "<p>die folgenden Aufgaben stehen bald an:</p>".to_string(),
    ];

    for (idx, bucket_label) in BUCKETS.iter().enumerate().take(4) {
        let bucket_tasks = &grouped[idx];
        if bucket_tasks.is_empty() {
            continue;
        }
        text_lines.push(format!("{bucket_label}:"));
        html_lines.push(format!("<h3>{bucket_label}</h3><ul>"));
        for task in bucket_tasks.iter().take(MAX_PER_BUCKET) {
            let title = task.get("title").and_then(Value::as_str).unwrap_or("Aufgabe");
            let due_date = format_due_date_de(task.get("due_date").and_then(Value::as_str));
            text_lines.push(format!("- {title} ({due_date})"));
            html_lines.push(format!("<li>{title} ({due_date})</li>"));
        }
        if bucket_tasks.len() > MAX_PER_BUCKET {
            let remaining = bucket_tasks.len() - MAX_PER_BUCKET;
            text_lines.push(format!("- ... und {remaining} weitere"));
            html_lines.push(format!("<li>... und {remaining} weitere</li>"));
        }
        text_lines.push(String::new());
        html_lines.push("</ul>".to_string());
    }

    text_lines.push(format!("Plan öffnen: {plan_url}"));
    text_lines.push(format!("Einstellungen: {settings_url}"));
    text_lines.push(format!("Abmelden: {unsubscribe_url}"));

    html_lines.push(format!("<p><a href=\"{plan_url}\">Plan öffnen</a></p>"));
    html_lines.push(format!(
        "<p><a href=\"{settings_url}\">Benachrichtigungseinstellungen</a></p>"
    ));
    html_lines.push(format!("<p><a href=\"{unsubscribe_url}\">Abmelden</a></p>"));

    RenderedEmail {
        subject: subject.clone(),
        text_body: text_lines.join("\n"),
        html_body: Some(html_lines.join("\n")),
        short_text: subject,
    }
}

fn format_due_date_de(raw: Option<&str>) -> String {
    let date = raw
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    date.format("%d.%m.%Y").to_string()
}
