use crate::error::{Result, SyncError};
use crate::io::append_line;
use crate::paths::Paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accepted retro categories, in display order.
pub const CATEGORIES: &[&str] = &[
    "friction",
    "success",
    "confusion",
    "observation",
    "debt",
    "tooling",
];

/// A single retrospective observation, stored as one JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetroItem {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub category: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Validate and append a retro item to the project's items file.
pub fn add_item(
    paths: &Paths,
    category: &str,
    text: &str,
    source: &str,
    context: Option<&str>,
) -> Result<RetroItem> {
    if !CATEGORIES.contains(&category) {
        return Err(SyncError::InvalidCategory(category.to_string()));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(SyncError::EmptyText);
    }

    let item = RetroItem {
        timestamp: Utc::now(),
        source: source.to_string(),
        category: category.to_string(),
        text: text.to_string(),
        context: context.map(str::to_string),
    };
    let line = serde_json::to_string(&item)?;
    append_line(&paths.retro_items(), &line)?;
    Ok(item)
}

/// Number of recorded items. Unparseable lines are not counted.
pub fn count_items(paths: &Paths) -> usize {
    let Ok(data) = std::fs::read_to_string(paths.retro_items()) else {
        return 0;
    };
    data.lines()
        .filter(|l| serde_json::from_str::<RetroItem>(l).is_ok())
        .count()
}
