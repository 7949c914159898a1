use crate::error::{Result, SyncError};
use crate::io::{atomic_write, ensure_dir};
use crate::paths::{to_kebab_case, Paths};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct Roadmap {
    pub version: String,
    pub created: String,
    pub updated: String,
    pub phases: Vec<Phase>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    pub number: u32,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub topics: Vec<Topic>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Topic {
    pub name: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Timestamps in roadmap frontmatter: YYYY-MM-DD-HHmmss.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d-%H%M%S").to_string()
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

static PHASE_RE: OnceLock<Regex> = OnceLock::new();
static TOPIC_RE: OnceLock<Regex> = OnceLock::new();
static FRONTMATTER_RE: OnceLock<Regex> = OnceLock::new();

fn phase_re() -> &'static Regex {
    PHASE_RE.get_or_init(|| Regex::new(r"^##\s+Phase\s+(\d+):\s+(.+)$").unwrap())
}

fn topic_re() -> &'static Regex {
    TOPIC_RE.get_or_init(|| Regex::new(r"^-\s+([a-z0-9-]+)\s+\[([A-Z\s]+)\]").unwrap())
}

fn frontmatter_re() -> &'static Regex {
    FRONTMATTER_RE.get_or_init(|| Regex::new(r"(?s)\A---\n(.*?)\n---").unwrap())
}

fn frontmatter_field(block: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(block)
        .map(|c| c[1].to_string())
}

impl Roadmap {
    pub fn new() -> Self {
        Self {
            version: "1.0".to_string(),
            ..Default::default()
        }
    }

    /// Parse ROADMAP.md content. Unrecognized lines are dropped; the result
    /// round-trips structure, not bytes.
    pub fn parse(content: &str) -> Self {
        let mut roadmap = Roadmap::new();

        if let Some(caps) = frontmatter_re().captures(content) {
            let fm = &caps[1];
            if let Some(v) = frontmatter_field(fm, r#"version:\s*"([^"]+)""#) {
                roadmap.version = v;
            }
            if let Some(c) = frontmatter_field(fm, r"created:\s*(\S+)") {
                roadmap.created = c;
            }
            if let Some(u) = frontmatter_field(fm, r"updated:\s*(\S+)") {
                roadmap.updated = u;
            }
        }

        let mut current_phase: Option<Phase> = None;
        let mut current_topic: Option<Topic> = None;

        for line in content.split('\n') {
            let trimmed = line.trim();

            if let Some(caps) = phase_re().captures(line) {
                if let Some(mut phase) = current_phase.take() {
                    if let Some(topic) = current_topic.take() {
                        phase.topics.push(topic);
                    }
                    roadmap.phases.push(phase);
                }
                current_phase = Some(Phase {
                    number: caps[1].parse().unwrap_or(0),
                    name: caps[2].trim().to_string(),
                    status: "queued".to_string(),
                    goal: None,
                    topics: Vec::new(),
                });
            } else if let Some(rest) = trimmed.strip_prefix("Status:") {
                if let Some(phase) = current_phase.as_mut() {
                    phase.status = rest.trim().to_lowercase();
                }
            } else if let Some(rest) = trimmed.strip_prefix("Goal:") {
                if let Some(phase) = current_phase.as_mut() {
                    phase.goal = Some(rest.trim().to_string());
                }
            } else if let Some(caps) = topic_re().captures(line) {
                if let (Some(phase), Some(topic)) = (current_phase.as_mut(), current_topic.take()) {
                    phase.topics.push(topic);
                }
                current_topic = Some(Topic {
                    name: caps[1].to_string(),
                    state: caps[2].trim().to_string(),
                    ..Default::default()
                });
            } else if let Some(topic) = current_topic.as_mut() {
                if let Some(rest) = trimmed.strip_prefix("- Summary:") {
                    topic.summary = Some(rest.trim().to_string());
                } else if let Some(rest) = trimmed.strip_prefix("- Epic:") {
                    topic.epic = Some(rest.trim().to_string());
                } else if let Some(rest) = trimmed.strip_prefix("- Directory:") {
                    topic.directory = Some(rest.trim().to_string());
                } else if let Some(rest) = trimmed.strip_prefix("- Dependencies:") {
                    topic.dependencies = split_list(rest);
                } else if let Some(rest) = trimmed.strip_prefix("- Labels:") {
                    topic.labels = split_list(rest);
                }
            }
        }

        if let Some(mut phase) = current_phase {
            if let Some(topic) = current_topic {
                phase.topics.push(topic);
            }
            roadmap.phases.push(phase);
        }

        roadmap
    }

    /// Render the roadmap back to Markdown with a fixed field order.
    pub fn write(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push("---".to_string());
        lines.push(format!("version: \"{}\"", self.version));
        let created = if self.created.is_empty() {
            timestamp()
        } else {
            self.created.clone()
        };
        lines.push(format!("created: {created}"));
        lines.push(format!("updated: {}", timestamp()));
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push("# Project Roadmap".to_string());
        lines.push(String::new());

        for phase in &self.phases {
            lines.push(format!("## Phase {}: {}", phase.number, phase.name));
            lines.push(String::new());
            if let Some(goal) = &phase.goal {
                lines.push(format!("Goal: {goal}"));
            }
            lines.push(format!("Status: {}", phase.status));
            lines.push(String::new());
            lines.push("### Topics".to_string());
            lines.push(String::new());

            for topic in &phase.topics {
                lines.push(format!("- {} [{}]", topic.name, topic.state));
                if let Some(summary) = &topic.summary {
                    lines.push(format!("  - Summary: {summary}"));
                }
                if let Some(epic) = &topic.epic {
                    lines.push(format!("  - Epic: {epic}"));
                }
                if let Some(directory) = &topic.directory {
                    lines.push(format!("  - Directory: {directory}"));
                }
                if !topic.dependencies.is_empty() {
                    lines.push(format!("  - Dependencies: {}", topic.dependencies.join(", ")));
                }
                if !topic.labels.is_empty() {
                    lines.push(format!("  - Labels: {}", topic.labels.join(", ")));
                }
                lines.push(String::new());
            }
        }

        lines.join("\n")
    }

    /// Load from disk; a missing file is an empty roadmap.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Roadmap::new(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.write().as_bytes())
    }

    pub fn find_topic(&self, slug: &str) -> Option<(&Phase, &Topic)> {
        self.phases.iter().find_map(|phase| {
            phase
                .topics
                .iter()
                .find(|t| t.name == slug)
                .map(|topic| (phase, topic))
        })
    }

    pub fn phase_mut(&mut self, number: u32) -> Option<&mut Phase> {
        self.phases.iter_mut().find(|p| p.number == number)
    }

    /// Add a topic to a phase. State is PLANNING when the topic directory
    /// already holds planning files, PROPOSED otherwise.
    pub fn add_topic(
        &mut self,
        paths: &Paths,
        phase_num: u32,
        name: &str,
        summary: Option<&str>,
        epic: Option<&str>,
    ) -> Result<String> {
        let slug = to_kebab_case(name);
        if self.find_topic(&slug).is_some() {
            return Err(SyncError::TopicExists(slug));
        }

        let state = if has_planning_files(paths, &slug) {
            "PLANNING"
        } else {
            "PROPOSED"
        };
        let topic = Topic {
            name: slug.clone(),
            state: state.to_string(),
            summary: summary.map(str::to_string),
            epic: epic.map(str::to_string),
            directory: Some(format!(".agent_planning/{slug}/")),
            ..Default::default()
        };

        let phase = self
            .phase_mut(phase_num)
            .ok_or(SyncError::PhaseNotFound(phase_num))?;
        phase.topics.push(topic);
        Ok(slug)
    }
}

fn split_list(rest: &str) -> Vec<String> {
    rest.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A topic is in-flight when its planning directory holds working files.
pub fn has_planning_files(paths: &Paths, slug: &str) -> bool {
    let dir = paths.topic_dir(slug);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    let markers = ["PLAN-", "EVALUATION-", "DOD-", "STATUS-"];
    entries.flatten().any(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        markers.iter().any(|m| name.contains(m))
    })
}

// ---------------------------------------------------------------------------
// Multi-topic detection
// ---------------------------------------------------------------------------

static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();

fn numbered_re() -> &'static Regex {
    NUMBERED_RE.get_or_init(|| Regex::new(r"(?m)^\d+\.\s+(.+)$").unwrap())
}

fn bullet_re() -> &'static Regex {
    BULLET_RE.get_or_init(|| Regex::new(r"(?m)^[-*•]\s+(.+)$").unwrap())
}

/// Split free-form input into topic candidates. A `.md` file reference is
/// always a single topic; otherwise semicolons, short newline lists, numbered
/// lists, and bullet lists all count as multiple.
pub fn detect_multiple_topics(text: &str) -> Vec<String> {
    let text = text.trim();

    if text.ends_with(".md") {
        return vec![text.to_string()];
    }

    if text.contains(';') {
        let items: Vec<String> = text
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if items.len() >= 2 {
            return items;
        }
    }

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() >= 3 {
        let topic_like = lines.iter().all(|l| l.len() < 100 && !l.ends_with('.'));
        if topic_like {
            return lines.iter().map(|l| l.to_string()).collect();
        }
    }

    let numbered: Vec<String> = numbered_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    if numbered.len() >= 2 {
        return numbered;
    }

    let bullets: Vec<String> = bullet_re()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect();
    if bullets.len() >= 2 {
        return bullets;
    }

    vec![text.to_string()]
}

// ---------------------------------------------------------------------------
// Batch add
// ---------------------------------------------------------------------------

static PRIORITY_RE: OnceLock<Regex> = OnceLock::new();

fn priority_re() -> &'static Regex {
    PRIORITY_RE.get_or_init(|| Regex::new(r"(?i)\bP(\d)\b").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInput {
    pub name: String,
    pub description: String,
    pub priority: Option<u32>,
}

/// Parse one batch entry: `name - desc`, `name: desc`, with an optional
/// `P<n>` priority marker anywhere in the text.
pub fn parse_topic_input(input: &str) -> TopicInput {
    let priority = priority_re()
        .captures(input)
        .and_then(|c| c[1].parse().ok());

    let (name, description) = if let Some((n, d)) = input.split_once(" - ") {
        (n, d)
    } else if let Some((n, d)) = input.split_once(": ") {
        (n, d)
    } else {
        (input, "")
    };

    TopicInput {
        name: name.trim().to_string(),
        description: description.trim().to_string(),
        priority,
    }
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub status: String,
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
    pub phases: BTreeMap<String, usize>,
}

/// Add 2+ topics at once, mapping `P<n>` priorities to phase numbers and
/// defaulting the rest to the active phase. Duplicates are skipped, topic
/// directories are created, and the roadmap is saved only if anything landed.
pub fn batch_add(paths: &Paths, input: &str) -> Result<BatchReport> {
    let topics = detect_multiple_topics(input);
    if topics.len() < 2 {
        return Err(SyncError::BatchTooSmall);
    }

    let mut roadmap = Roadmap::load(&paths.roadmap());
    if roadmap.phases.is_empty() {
        roadmap.phases.push(Phase {
            number: 1,
            name: "MVP".to_string(),
            status: "active".to_string(),
            goal: Some("Deliver core functionality".to_string()),
            topics: Vec::new(),
        });
    }

    let default_phase = roadmap
        .phases
        .iter()
        .find(|p| p.status == "active")
        .map(|p| p.number)
        .unwrap_or(1);
    let phase_count = roadmap.phases.len() as u32;

    let parsed: Vec<(TopicInput, u32)> = topics
        .iter()
        .map(|t| {
            let input = parse_topic_input(t);
            let phase = match input.priority {
                Some(p) if p >= 1 && p <= phase_count => p,
                _ => default_phase,
            };
            (input, phase)
        })
        .collect();

    let mut added = 0;
    let mut skipped = 0;

    for (input, phase_num) in &parsed {
        let slug = to_kebab_case(&input.name);
        if roadmap.find_topic(&slug).is_some() {
            skipped += 1;
            continue;
        }
        ensure_dir(&paths.topic_dir(&slug))?;
        let summary = (!input.description.is_empty()).then_some(input.description.as_str());
        roadmap.add_topic(paths, *phase_num, &slug, summary, None)?;
        added += 1;
    }

    if added > 0 {
        roadmap.save(&paths.roadmap())?;
    }

    let mut phase_counts: BTreeMap<u32, usize> = BTreeMap::new();
    for (_, phase_num) in &parsed {
        *phase_counts.entry(*phase_num).or_default() += 1;
    }
    let mut phases = BTreeMap::new();
    for (number, count) in phase_counts {
        if let Some(phase) = roadmap.phases.iter().find(|p| p.number == number) {
            phases.insert(format!("Phase {}: {}", number, phase.name), count);
        }
    }

    Ok(BatchReport {
        status: "batch_added".to_string(),
        added,
        skipped,
        total: parsed.len(),
        phases,
    })
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

static NARRATIVE_PHASE_RE: OnceLock<Regex> = OnceLock::new();
static NARRATIVE_TOPIC_RE: OnceLock<Regex> = OnceLock::new();

fn narrative_phase_re() -> &'static Regex {
    NARRATIVE_PHASE_RE
        .get_or_init(|| Regex::new(r"^##\s+Phase\s+(\d+):\s+(.+?)(?:\s+\[([A-Z]+)\])?$").unwrap())
}

fn narrative_topic_re() -> &'static Regex {
    NARRATIVE_TOPIC_RE
        .get_or_init(|| Regex::new(r"^####\s+([a-z0-9-]+)(?:\s+\[([A-Z\s]+)\])?").unwrap())
}

/// Does this content need migration to the list-item schema?
pub fn needs_migration(content: &str) -> (bool, String) {
    if !content.trim_start().starts_with("---") {
        return (true, "missing YAML frontmatter".to_string());
    }
    if content.contains("####") {
        return (true, "uses H4 headers instead of list items".to_string());
    }
    for field in ["**Description**", "**Tools", "**Pain point"] {
        if content.contains(field) {
            return (true, "contains custom narrative fields".to_string());
        }
    }
    (false, "already compliant".to_string())
}

/// Convert the narrative format (H4 topic headers, bold description fields)
/// into the structured schema, folding the prose into topic summaries.
pub fn migrate_narrative(content: &str) -> Result<Roadmap> {
    let mut roadmap = Roadmap::new();
    roadmap.created = timestamp();
    roadmap.updated = roadmap.created.clone();

    let mut current_phase: Option<Phase> = None;
    let mut current_topic: Option<(Topic, Vec<String>)> = None;

    let finish_topic = |phase: &mut Phase, pending: Option<(Topic, Vec<String>)>| {
        if let Some((mut topic, parts)) = pending {
            if !parts.is_empty() {
                topic.summary = Some(parts.join(" | "));
            }
            phase.topics.push(topic);
        }
    };

    for line in content.split('\n') {
        let trimmed = line.trim();

        if let Some(caps) = narrative_phase_re().captures(line) {
            if let Some(mut phase) = current_phase.take() {
                finish_topic(&mut phase, current_topic.take());
                roadmap.phases.push(phase);
            }
            let number: u32 = caps[1].parse().unwrap_or(0);
            let status = caps
                .get(3)
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_else(|| {
                    if number == 1 {
                        "active".to_string()
                    } else {
                        "queued".to_string()
                    }
                });
            current_phase = Some(Phase {
                number,
                name: caps[2].trim().to_string(),
                status,
                goal: None,
                topics: Vec::new(),
            });
        } else if let Some(rest) = trimmed.strip_prefix("Goal:") {
            if let Some(phase) = current_phase.as_mut() {
                phase.goal = Some(rest.trim().to_string());
            }
        } else if let Some(rest) = trimmed.strip_prefix("Status:") {
            if let Some(phase) = current_phase.as_mut() {
                phase.status = rest.trim().to_lowercase();
            }
        } else if let Some(caps) = narrative_topic_re().captures(line) {
            if let Some(phase) = current_phase.as_mut() {
                finish_topic(phase, current_topic.take());
            }
            let name = caps[1].to_string();
            let state = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| "PROPOSED".to_string());
            current_topic = Some((
                Topic {
                    directory: Some(format!(".agent_planning/{name}/")),
                    name,
                    state,
                    ..Default::default()
                },
                Vec::new(),
            ));
        } else if let Some((topic, parts)) = current_topic.as_mut() {
            if let Some(rest) = trimmed.strip_prefix("**Description**:") {
                let desc = rest.trim();
                if !desc.is_empty() {
                    parts.push(desc.to_string());
                }
            } else if let Some(rest) = trimmed.strip_prefix("**Pain point**:") {
                let pain = rest.trim();
                if !pain.is_empty() {
                    parts.push(format!("Pain: {pain}"));
                }
            } else if let Some(rest) = trimmed.strip_prefix("**Directory**:") {
                topic.directory = Some(rest.trim().to_string());
            } else if trimmed.starts_with('-') && !trimmed.starts_with("---") {
                let detail = trimmed[1..].trim();
                if !detail.is_empty()
                    && !detail.starts_with("Summary:")
                    && !detail.starts_with("Epic:")
                {
                    parts.push(detail.to_string());
                }
            }
        }
    }

    if let Some(mut phase) = current_phase {
        finish_topic(&mut phase, current_topic);
        roadmap.phases.push(phase);
    }

    if roadmap.phases.is_empty() {
        return Err(SyncError::NoPhases);
    }
    Ok(roadmap)
}

// ---------------------------------------------------------------------------
// Context validation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ContextCheck {
    pub valid: bool,
    pub feedback: String,
}

const PROBLEM_WORDS: &[&str] = &[
    "fix", "bug", "issue", "error", "problem", "broken", "fails", "correct", "improve",
    "resolve", "handle",
];

const OUTCOME_WORDS: &[&str] = &[
    "add", "implement", "create", "enable", "support", "improve", "refactor", "enhance",
    "consolidate", "centralize",
];

const AREA_WORDS: &[&str] = &[
    "tool", "module", "component", "system", "handler", "manager", "service", "layer",
    "interface", "bridge", "adapter", "endpoint",
];

/// A summary is sufficient when it is at least 20 chars and hits two of three
/// indicator classes (problem, outcome, area).
pub fn validate_context(summary: &str) -> ContextCheck {
    let summary = summary.trim();
    if summary.len() < 20 {
        return ContextCheck {
            valid: false,
            feedback: "Summary too brief (min 20 chars)".to_string(),
        };
    }

    let lowered = summary.to_lowercase();
    let has_problem = PROBLEM_WORDS.iter().any(|w| lowered.contains(w));
    let has_outcome = OUTCOME_WORDS.iter().any(|w| lowered.contains(w));
    let has_area = AREA_WORDS.iter().any(|w| lowered.contains(w));

    let indicators = [has_problem, has_outcome, has_area]
        .iter()
        .filter(|b| **b)
        .count();
    if indicators >= 2 {
        return ContextCheck {
            valid: true,
            feedback: String::new(),
        };
    }

    let mut missing = Vec::new();
    if !has_problem && !has_outcome {
        missing.push("problem/outcome");
    }
    if !has_area {
        missing.push("project areas");
    }
    ContextCheck {
        valid: false,
        feedback: format!("Need: {}", missing.join(", ")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths() -> (TempDir, Paths) {
        let dir = TempDir::new().unwrap();
        let p = Paths::with_home(dir.path().join("proj"), dir.path().join("home"));
        (dir, p)
    }

    const SAMPLE: &str = "\
---
version: \"1.0\"
created: 2026-01-01-000000
updated: 2026-01-02-000000
---

# Project Roadmap

## Phase 1: Core

Goal: Ship the basics
Status: active

### Topics

- user-auth [IN PROGRESS]
  - Summary: Add login flow
  - Directory: .agent_planning/user-auth/
  - Dependencies: session-store, token-cache
  - Labels: security, p1

- session-store [PROPOSED]

## Phase 2: Polish

Status: queued

### Topics
";

    #[test]
    fn parses_frontmatter_and_structure() {
        let r = Roadmap::parse(SAMPLE);
        assert_eq!(r.version, "1.0");
        assert_eq!(r.created, "2026-01-01-000000");
        assert_eq!(r.phases.len(), 2);

        let p1 = &r.phases[0];
        assert_eq!(p1.number, 1);
        assert_eq!(p1.name, "Core");
        assert_eq!(p1.status, "active");
        assert_eq!(p1.goal.as_deref(), Some("Ship the basics"));
        assert_eq!(p1.topics.len(), 2);

        let auth = &p1.topics[0];
        assert_eq!(auth.name, "user-auth");
        assert_eq!(auth.state, "IN PROGRESS");
        assert_eq!(auth.summary.as_deref(), Some("Add login flow"));
        assert_eq!(auth.dependencies, vec!["session-store", "token-cache"]);
        assert_eq!(auth.labels, vec!["security", "p1"]);

        assert_eq!(r.phases[1].status, "queued");
        assert!(r.phases[1].topics.is_empty());
    }

    #[test]
    fn structural_round_trip() {
        let first = Roadmap::parse(SAMPLE);
        let second = Roadmap::parse(&first.write());
        assert_eq!(second.phases.len(), first.phases.len());
        for (a, b) in first.phases.iter().zip(&second.phases) {
            assert_eq!(a.number, b.number);
            assert_eq!(a.name, b.name);
            assert_eq!(a.status, b.status);
            assert_eq!(a.goal, b.goal);
            assert_eq!(a.topics.len(), b.topics.len());
            for (t1, t2) in a.topics.iter().zip(&b.topics) {
                assert_eq!(t1.name, t2.name);
                assert_eq!(t1.state, t2.state);
                assert_eq!(t1.summary, t2.summary);
                assert_eq!(t1.dependencies, t2.dependencies);
                assert_eq!(t1.labels, t2.labels);
            }
        }
    }

    #[test]
    fn load_missing_file_is_empty() {
        let (_dir, p) = paths();
        let r = Roadmap::load(&p.roadmap());
        assert_eq!(r.version, "1.0");
        assert!(r.phases.is_empty());
    }

    #[test]
    fn add_topic_defaults_to_proposed() {
        let (_dir, p) = paths();
        let mut r = Roadmap::parse(SAMPLE);
        let slug = r
            .add_topic(&p, 2, "Rate Limiting", Some("Throttle the API"), None)
            .unwrap();
        assert_eq!(slug, "rate-limiting");
        let (phase, topic) = r.find_topic("rate-limiting").unwrap();
        assert_eq!(phase.number, 2);
        assert_eq!(topic.state, "PROPOSED");
        assert_eq!(topic.directory.as_deref(), Some(".agent_planning/rate-limiting/"));
    }

    #[test]
    fn add_topic_detects_planning_files() {
        let (_dir, p) = paths();
        let dir = p.topic_dir("rate-limiting");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("PLAN-2026-01-01.md"), "plan").unwrap();

        let mut r = Roadmap::parse(SAMPLE);
        r.add_topic(&p, 1, "rate-limiting", None, None).unwrap();
        let (_, topic) = r.find_topic("rate-limiting").unwrap();
        assert_eq!(topic.state, "PLANNING");
    }

    #[test]
    fn add_topic_missing_phase_errors() {
        let (_dir, p) = paths();
        let mut r = Roadmap::parse(SAMPLE);
        let err = r.add_topic(&p, 9, "x y", None, None).unwrap_err();
        assert!(matches!(err, SyncError::PhaseNotFound(9)));
    }

    #[test]
    fn add_topic_duplicate_errors() {
        let (_dir, p) = paths();
        let mut r = Roadmap::parse(SAMPLE);
        let err = r.add_topic(&p, 1, "user-auth", None, None).unwrap_err();
        assert!(matches!(err, SyncError::TopicExists(_)));
    }

    #[test]
    fn detect_topics_variants() {
        assert_eq!(detect_multiple_topics("notes/plan.md").len(), 1);
        assert_eq!(detect_multiple_topics("auth; caching; metrics").len(), 3);
        assert_eq!(detect_multiple_topics("1. first thing\n2. second thing").len(), 2);
        assert_eq!(detect_multiple_topics("- alpha\n- beta").len(), 2);
        assert_eq!(detect_multiple_topics("one\ntwo\nthree").len(), 3);
        assert_eq!(detect_multiple_topics("just one topic").len(), 1);
    }

    #[test]
    fn long_prose_lines_are_single() {
        let prose = "This is a sentence.\nAnother full sentence.\nAnd a third one.";
        assert_eq!(detect_multiple_topics(prose).len(), 1);
    }

    #[test]
    fn parse_topic_input_forms() {
        let t = parse_topic_input("auth flow - P2 add login");
        assert_eq!(t.name, "auth flow");
        assert_eq!(t.description, "P2 add login");
        assert_eq!(t.priority, Some(2));

        let t = parse_topic_input("caching: speed things up");
        assert_eq!(t.name, "caching");
        assert_eq!(t.priority, None);

        let t = parse_topic_input("bare-topic");
        assert_eq!(t.name, "bare-topic");
        assert_eq!(t.description, "");
    }

    #[test]
    fn batch_add_distributes_and_skips() {
        let (_dir, p) = paths();
        Roadmap::parse(SAMPLE).save(&p.roadmap()).unwrap();

        let report = batch_add(&p, "user-auth - already there; metrics - P2 add dashboards; caching - speed up reads").unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total, 3);
        assert_eq!(report.phases.get("Phase 1: Core"), Some(&2));
        assert_eq!(report.phases.get("Phase 2: Polish"), Some(&1));

        let r = Roadmap::load(&p.roadmap());
        assert!(r.find_topic("metrics").is_some());
        assert!(p.topic_dir("caching").is_dir());
    }

    #[test]
    fn batch_add_seeds_default_phase() {
        let (_dir, p) = paths();
        let report = batch_add(&p, "alpha - first; beta - second").unwrap();
        assert_eq!(report.added, 2);
        let r = Roadmap::load(&p.roadmap());
        assert_eq!(r.phases[0].name, "MVP");
        assert_eq!(r.phases[0].topics.len(), 2);
    }

    #[test]
    fn batch_add_rejects_single_topic() {
        let (_dir, p) = paths();
        let err = batch_add(&p, "just one topic").unwrap_err();
        assert!(matches!(err, SyncError::BatchTooSmall));
    }

    #[test]
    fn migration_detection() {
        assert!(needs_migration("# Roadmap\n## Phase 1: X").0);
        assert!(needs_migration("---\nversion: \"1.0\"\n---\n#### topic-a").0);
        assert!(needs_migration("---\nx\n---\n**Description**: stuff").0);
        assert!(!needs_migration(SAMPLE).0);
    }

    #[test]
    fn migrates_narrative_format() {
        let narrative = "\
# Old Roadmap

## Phase 1: Foundations [ACTIVE]

Goal: Get started

#### browser-bridge [IN PROGRESS]
**Description**: Connect to the browser
**Pain point**: Manual copy-paste
- needs websocket support

## Phase 2: Extras

#### exports
";
        let r = migrate_narrative(narrative).unwrap();
        assert_eq!(r.phases.len(), 2);
        assert_eq!(r.phases[0].status, "active");
        assert_eq!(r.phases[0].goal.as_deref(), Some("Get started"));

        let bridge = &r.phases[0].topics[0];
        assert_eq!(bridge.name, "browser-bridge");
        assert_eq!(bridge.state, "IN PROGRESS");
        assert_eq!(
            bridge.summary.as_deref(),
            Some("Connect to the browser | Pain: Manual copy-paste | needs websocket support")
        );

        let exports = &r.phases[1].topics[0];
        assert_eq!(exports.state, "PROPOSED");
        assert_eq!(r.phases[1].status, "queued");
    }

    #[test]
    fn migrate_empty_content_errors() {
        assert!(matches!(
            migrate_narrative("no phases here"),
            Err(SyncError::NoPhases)
        ));
    }

    #[test]
    fn context_validation() {
        let ok = validate_context("Fix the broken error handler in the sync module");
        assert!(ok.valid);

        let brief = validate_context("too short");
        assert!(!brief.valid);
        assert!(brief.feedback.contains("brief"));

        let vague = validate_context("some general thoughts about the future of things");
        assert!(!vague.valid);
        assert!(vague.feedback.starts_with("Need:"));
    }
}
