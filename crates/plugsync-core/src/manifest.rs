use crate::error::Result;
use crate::extension::{Extension, ExtensionKind};
use crate::graph::DependencyGraph;
use crate::io::atomic_write;
use crate::usage::UsageStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// SyncRule
// ---------------------------------------------------------------------------

/// A manual rule for syncing one extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRule {
    pub extension: String,
    #[serde(default = "default_true")]
    pub include_dependencies: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub notes: String,
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// SyncManifest (rule manifest)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoSync {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_auto_count")]
    pub count: usize,
    #[serde(default = "default_min_usage")]
    pub min_usage: u64,
}

fn default_auto_count() -> usize {
    10
}

fn default_min_usage() -> u64 {
    5
}

impl Default for AutoSync {
    fn default() -> Self {
        Self {
            enabled: false,
            count: default_auto_count(),
            min_usage: default_min_usage(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default = "default_true")]
    pub remove_stale: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { remove_stale: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Manifest controlling what gets synced: explicit rules plus an optional
/// auto-sync-most-used policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub sync_rules: Vec<SyncRule>,
    #[serde(default)]
    pub auto_sync: AutoSync,
    #[serde(default)]
    pub options: SyncOptions,
    #[serde(default)]
    pub metadata: SyncMetadata,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for SyncManifest {
    fn default() -> Self {
        Self {
            version: default_version(),
            sync_rules: Vec::new(),
            auto_sync: AutoSync::default(),
            options: SyncOptions::default(),
            metadata: SyncMetadata::default(),
        }
    }
}

impl SyncManifest {
    /// Load from file; a missing file yields the default manifest.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(path, data.as_bytes())
    }

    /// Add a rule, replacing any existing rule for the same extension.
    pub fn add_rule(&mut self, rule: SyncRule) {
        self.sync_rules.retain(|r| r.extension != rule.extension);
        self.sync_rules.push(rule);
    }

    /// Remove the rule for an extension. Returns `true` if one was removed.
    pub fn remove_rule(&mut self, extension: &str) -> bool {
        let before = self.sync_rules.len();
        self.sync_rules.retain(|r| r.extension != extension);
        self.sync_rules.len() < before
    }

    /// Union of explicitly listed extensions (optionally with their
    /// transitive dependency closure) and auto-synced most-used skills.
    pub fn extensions_to_sync(
        &self,
        usage: &UsageStats,
        graph: &DependencyGraph,
    ) -> BTreeSet<Extension> {
        let mut result = BTreeSet::new();

        for rule in &self.sync_rules {
            let Some(ext) = graph.extensions.get(&rule.extension) else {
                tracing::debug!("sync rule for unknown extension: {}", rule.extension);
                continue;
            };
            result.insert(ext.clone());
            if rule.include_dependencies {
                for dep in graph.all_dependencies(&rule.extension) {
                    if let Some(d) = graph.extensions.get(&dep) {
                        result.insert(d.clone());
                    }
                }
            }
        }

        if self.auto_sync.enabled {
            for stats in usage.most_used(self.auto_sync.count) {
                if stats.usage_count < self.auto_sync.min_usage {
                    continue;
                }
                if let Some(full_name) = match_skill_name(graph, &stats.skill_name) {
                    if let Some(ext) = graph.extensions.get(&full_name) {
                        result.insert(ext.clone());
                    }
                    for dep in graph.all_dependencies(&full_name) {
                        if let Some(d) = graph.extensions.get(&dep) {
                            result.insert(d.clone());
                        }
                    }
                }
            }
        }

        result
    }

    /// Generate a manifest from usage statistics.
    pub fn from_usage(
        usage: &UsageStats,
        graph: &DependencyGraph,
        top_n: usize,
        min_usage: u64,
    ) -> Self {
        let mut manifest = Self::default();
        for stats in usage.most_used(top_n) {
            if stats.usage_count < min_usage {
                continue;
            }
            if let Some(full_name) = match_skill_name(graph, &stats.skill_name) {
                manifest.add_rule(SyncRule {
                    extension: full_name,
                    include_dependencies: true,
                    priority: stats.usage_count as i64,
                    notes: format!(
                        "Used {} times, last used {} days ago",
                        stats.usage_count,
                        stats.days_since_last_use()
                    ),
                });
            }
        }
        manifest
    }

    /// Starter manifest written by `plugsync sync --init`.
    pub fn template() -> Self {
        let mut manifest = Self::default();
        manifest.add_rule(SyncRule {
            extension: "do:plan".to_string(),
            include_dependencies: true,
            priority: 100,
            notes: "Essential planning workflow".to_string(),
        });
        manifest.add_rule(SyncRule {
            extension: "do:it".to_string(),
            include_dependencies: true,
            priority: 90,
            notes: "Essential implementation workflow".to_string(),
        });
        manifest.auto_sync.enabled = true;
        manifest
    }
}

/// Match a usage-stats skill name to a graph full name: exact, then
/// `:name` or `-name` suffix.
fn match_skill_name(graph: &DependencyGraph, skill_name: &str) -> Option<String> {
    if graph.extensions.contains_key(skill_name) {
        return Some(skill_name.to_string());
    }
    let colon = format!(":{skill_name}");
    let dash = format!("-{skill_name}");
    graph
        .extensions
        .keys()
        .find(|k| k.ends_with(&colon) || k.ends_with(&dash))
        .cloned()
}

// ---------------------------------------------------------------------------
// StateManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Removed,
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordStatus::Active => "active",
            RecordStatus::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// One synced target as recorded in the state manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub source: String,
    pub plugin: String,
    pub status: RecordStatus,
}

/// Persisted record of everything the sync process has ever created.
///
/// Entries are tombstoned (`removed`) rather than deleted so runs stay
/// auditable, and cleanup only ever touches targets recorded here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateManifest {
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skills: BTreeMap<String, SyncRecord>,
    #[serde(default)]
    pub agents: BTreeMap<String, SyncRecord>,
    #[serde(default)]
    pub commands: BTreeMap<String, SyncRecord>,
}

impl StateManifest {
    /// Load from file. A missing or corrupt manifest is treated as empty —
    /// the sync must still be able to run.
    pub fn load(path: &Path) -> Self {
        let Ok(data) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&data) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("ignoring corrupt manifest {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(path, data.as_bytes())
    }

    pub fn category(&self, kind: ExtensionKind) -> &BTreeMap<String, SyncRecord> {
        match kind {
            ExtensionKind::Skill => &self.skills,
            ExtensionKind::Agent => &self.agents,
            ExtensionKind::Command => &self.commands,
        }
    }

    pub fn category_mut(
        &mut self,
        kind: ExtensionKind,
    ) -> &mut BTreeMap<String, SyncRecord> {
        match kind {
            ExtensionKind::Skill => &mut self.skills,
            ExtensionKind::Agent => &mut self.agents,
            ExtensionKind::Command => &mut self.commands,
        }
    }

    /// Names recorded as active in a category.
    pub fn active_names(&self, kind: ExtensionKind) -> BTreeSet<String> {
        self.category(kind)
            .iter()
            .filter(|(_, r)| r.status == RecordStatus::Active)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ext(plugin: &str, name: &str) -> Extension {
        Extension {
            plugin: plugin.to_string(),
            name: name.to_string(),
            kind: ExtensionKind::Skill,
            file_path: PathBuf::from(format!("/p/{name}.md")),
            references: Default::default(),
        }
    }

    fn graph_with_deps() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_extension(ext("do", "plan"));
        g.add_extension(ext("do", "evaluate"));
        g.add_extension(ext("do", "it"));
        g.add_dependency("do:plan", "do:evaluate");
        g
    }

    #[test]
    fn rule_manifest_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync-manifest.json");
        let mut m = SyncManifest::template();
        m.metadata.last_sync = Some(Utc::now());
        m.save(&path).unwrap();

        let loaded = SyncManifest::load(&path).unwrap();
        assert_eq!(loaded.sync_rules.len(), 2);
        assert!(loaded.auto_sync.enabled);
        assert!(loaded.options.remove_stale);
    }

    #[test]
    fn rule_manifest_wire_format_is_camel_case() {
        let m = SyncManifest::template();
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("syncRules").is_some());
        assert!(json["autoSync"].get("minUsage").is_some());
        assert!(json["syncRules"][0].get("includeDependencies").is_some());
    }

    #[test]
    fn add_rule_replaces_existing() {
        let mut m = SyncManifest::default();
        m.add_rule(SyncRule {
            extension: "do:plan".into(),
            include_dependencies: true,
            priority: 1,
            notes: String::new(),
        });
        m.add_rule(SyncRule {
            extension: "do:plan".into(),
            include_dependencies: false,
            priority: 9,
            notes: String::new(),
        });
        assert_eq!(m.sync_rules.len(), 1);
        assert_eq!(m.sync_rules[0].priority, 9);
    }

    #[test]
    fn explicit_rules_pull_dependencies() {
        let g = graph_with_deps();
        let mut m = SyncManifest::default();
        m.add_rule(SyncRule {
            extension: "do:plan".into(),
            include_dependencies: true,
            priority: 0,
            notes: String::new(),
        });
        let set = m.extensions_to_sync(&UsageStats::default(), &g);
        let names: Vec<String> = set.iter().map(|e| e.full_name()).collect();
        assert!(names.contains(&"do:plan".to_string()));
        assert!(names.contains(&"do:evaluate".to_string()));
        assert!(!names.contains(&"do:it".to_string()));
    }

    #[test]
    fn include_dependencies_false_syncs_alone() {
        let g = graph_with_deps();
        let mut m = SyncManifest::default();
        m.add_rule(SyncRule {
            extension: "do:plan".into(),
            include_dependencies: false,
            priority: 0,
            notes: String::new(),
        });
        let set = m.extensions_to_sync(&UsageStats::default(), &g);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn auto_sync_respects_min_usage() {
        let g = graph_with_deps();
        let usage = UsageStats::from_value(&json!({
            "skillUsage": {
                "it": {"usageCount": 50, "lastUsedAt": 1700000000000_i64},
                "plan": {"usageCount": 1, "lastUsedAt": 1700000000000_i64}
            }
        }));
        let mut m = SyncManifest::default();
        m.auto_sync.enabled = true;
        m.auto_sync.min_usage = 5;
        let set = m.extensions_to_sync(&usage, &g);
        let names: Vec<String> = set.iter().map(|e| e.full_name()).collect();
        assert_eq!(names, vec!["do:it".to_string()]);
    }

    #[test]
    fn generate_from_usage_builds_rules() {
        let g = graph_with_deps();
        let usage = UsageStats::from_value(&json!({
            "skillUsage": {
                "plan": {"usageCount": 30, "lastUsedAt": 1700000000000_i64}
            }
        }));
        let m = SyncManifest::from_usage(&usage, &g, 10, 5);
        assert_eq!(m.sync_rules.len(), 1);
        assert_eq!(m.sync_rules[0].extension, "do:plan");
        assert_eq!(m.sync_rules[0].priority, 30);
    }

    #[test]
    fn state_manifest_tolerates_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claude-sync-manifest.json");
        std::fs::write(&path, "{broken").unwrap();
        let m = StateManifest::load(&path);
        assert!(m.skills.is_empty());
    }

    #[test]
    fn state_manifest_active_names() {
        let mut m = StateManifest::default();
        m.skills.insert(
            "do-plan".into(),
            SyncRecord {
                source: "/p/plan".into(),
                plugin: "do".into(),
                status: RecordStatus::Active,
            },
        );
        m.skills.insert(
            "old".into(),
            SyncRecord {
                source: "/p/old".into(),
                plugin: "do".into(),
                status: RecordStatus::Removed,
            },
        );
        let active = m.active_names(ExtensionKind::Skill);
        assert_eq!(active.len(), 1);
        assert!(active.contains("do-plan"));
    }
}
