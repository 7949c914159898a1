use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// SkillUsage
// ---------------------------------------------------------------------------

/// Usage statistics for a single skill, from `~/.claude.json`.
#[derive(Debug, Clone, Serialize)]
pub struct SkillUsage {
    pub skill_name: String,
    pub usage_count: u64,
    pub last_used_at: DateTime<Utc>,
}

impl SkillUsage {
    pub fn days_since_last_use(&self) -> i64 {
        (Utc::now() - self.last_used_at).num_days()
    }
}

// ---------------------------------------------------------------------------
// UsageStats
// ---------------------------------------------------------------------------

/// Skill usage records parsed out of the host CLI's config file.
#[derive(Debug, Default, Clone)]
pub struct UsageStats {
    pub skill_usage: BTreeMap<String, SkillUsage>,
    pub num_startups: u64,
}

impl UsageStats {
    /// Load from a `.claude.json` file. A missing or malformed file yields
    /// empty stats; usage data is advisory, never a reason to fail a sync.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(_) => return Self::default(),
        };
        let value: serde_json::Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ignoring malformed config {}: {e}", path.display());
                return Self::default();
            }
        };
        Self::from_value(&value)
    }

    pub fn from_value(value: &serde_json::Value) -> Self {
        let mut skill_usage = BTreeMap::new();
        if let Some(usage) = value.get("skillUsage").and_then(|v| v.as_object()) {
            for (name, stats) in usage {
                let count = stats.get("usageCount").and_then(|v| v.as_u64()).unwrap_or(0);
                // lastUsedAt is epoch milliseconds
                let millis = stats.get("lastUsedAt").and_then(|v| v.as_i64()).unwrap_or(0);
                let last_used_at = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
                skill_usage.insert(
                    name.clone(),
                    SkillUsage {
                        skill_name: name.clone(),
                        usage_count: count,
                        last_used_at,
                    },
                );
            }
        }
        Self {
            skill_usage,
            num_startups: value.get("numStartups").and_then(|v| v.as_u64()).unwrap_or(0),
        }
    }

    /// Most frequently used skills, descending by count.
    pub fn most_used(&self, limit: usize) -> Vec<&SkillUsage> {
        let mut all: Vec<&SkillUsage> = self.skill_usage.values().collect();
        all.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        all.truncate(limit);
        all
    }

    /// Skills used within the last `days` days, most recent first.
    pub fn recently_used(&self, days: i64, limit: usize) -> Vec<&SkillUsage> {
        let mut recent: Vec<&SkillUsage> = self
            .skill_usage
            .values()
            .filter(|s| s.days_since_last_use() <= days)
            .collect();
        recent.sort_by(|a, b| b.last_used_at.cmp(&a.last_used_at));
        recent.truncate(limit);
        recent
    }

    pub fn get(&self, skill_name: &str) -> Option<&SkillUsage> {
        self.skill_usage.get(skill_name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> UsageStats {
        UsageStats::from_value(&json!({
            "numStartups": 42,
            "skillUsage": {
                "do:plan": {"usageCount": 30, "lastUsedAt": 1700000000000_i64},
                "do:it": {"usageCount": 12, "lastUsedAt": 1700000100000_i64},
                "rarely": {"usageCount": 1, "lastUsedAt": 0}
            }
        }))
    }

    #[test]
    fn parses_counts_and_startups() {
        let stats = sample();
        assert_eq!(stats.num_startups, 42);
        assert_eq!(stats.get("do:plan").unwrap().usage_count, 30);
    }

    #[test]
    fn most_used_ordering() {
        let stats = sample();
        let top: Vec<&str> = stats
            .most_used(2)
            .iter()
            .map(|s| s.skill_name.as_str())
            .collect();
        assert_eq!(top, vec!["do:plan", "do:it"]);
    }

    #[test]
    fn missing_file_yields_empty() {
        let stats = UsageStats::load(Path::new("/nonexistent/.claude.json"));
        assert!(stats.skill_usage.is_empty());
    }

    #[test]
    fn malformed_json_yields_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".claude.json");
        std::fs::write(&path, "not json {{").unwrap();
        let stats = UsageStats::load(&path);
        assert!(stats.skill_usage.is_empty());
    }
}
