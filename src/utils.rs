//! Small helpers shared across the service

use chrono::{DateTime, Utc};

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Strip leading indentation from every line of a multi-line literal
pub fn trim_lines(text: &str) -> String {
    text.lines()
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Bold, upper-cased list for prompts: `**EU**, **NA**`
pub fn bold_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("**{}**", item.as_ref().to_uppercase()))
        .collect::<Vec<_>>()
        .join(", ")
}
