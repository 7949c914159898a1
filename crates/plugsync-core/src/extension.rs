use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// ExtensionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    Skill,
    Agent,
    Command,
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtensionKind::Skill => "skill",
            ExtensionKind::Agent => "agent",
            ExtensionKind::Command => "command",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

/// A skill, agent, or command unit belonging to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Extension {
    pub plugin: String,
    pub name: String,
    pub kind: ExtensionKind,
    pub file_path: PathBuf,
    pub references: BTreeSet<String>,
}

impl Extension {
    /// Namespaced full name, `plugin:name`.
    pub fn full_name(&self) -> String {
        if self.plugin.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.plugin, self.name)
        }
    }
}

// ---------------------------------------------------------------------------
// Reference patterns
// ---------------------------------------------------------------------------

/// A declared pattern for spotting extension references in file content.
///
/// Regex extraction is inherently approximate; each pattern carries a
/// confidence so callers can filter out the weaker heuristics.
#[derive(Debug, Clone, Copy)]
pub struct RefPattern {
    pub name: &'static str,
    pub pattern: &'static str,
    pub confidence: f64,
}

pub const REF_PATTERNS: &[RefPattern] = &[
    RefPattern {
        name: "skill-invocation",
        pattern: r"(?i)\bskill\s+([a-z0-9-]+:[a-z0-9-]+)",
        confidence: 0.9,
    },
    RefPattern {
        name: "slash-command",
        pattern: r"(?i)/([a-z0-9-]+:[a-z0-9-]+)",
        confidence: 0.8,
    },
    RefPattern {
        name: "skill-call",
        pattern: r#"(?i)skill\(["']([a-z0-9:-]+)["']\)"#,
        confidence: 0.95,
    },
    RefPattern {
        name: "agent-prose",
        pattern: r"(?i)(?:use|spawn|launch|call)\s+(?:the\s+)?([a-z0-9]+(?:-[a-z0-9]+)*)\s+agent",
        confidence: 0.5,
    },
    RefPattern {
        name: "subagent-type",
        pattern: r#"(?i)subagent_type=["']([a-z0-9:-]+)["']"#,
        confidence: 0.95,
    },
    RefPattern {
        name: "agent-type",
        pattern: r#"(?i)agent_type=["']([a-z0-9:-]+)["']"#,
        confidence: 0.95,
    },
];

static COMPILED: OnceLock<Vec<Regex>> = OnceLock::new();

fn compiled_patterns() -> &'static [Regex] {
    COMPILED.get_or_init(|| {
        REF_PATTERNS
            .iter()
            .map(|p| Regex::new(p.pattern).unwrap())
            .collect()
    })
}

/// A single reference hit with the confidence of the pattern that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RefMatch {
    pub reference: String,
    pub pattern: &'static str,
    pub confidence: f64,
}

/// Scan content for extension references, reporting each hit with its
/// pattern confidence.
pub fn scan_content(content: &str) -> Vec<RefMatch> {
    let mut matches = Vec::new();
    for (pattern, re) in REF_PATTERNS.iter().zip(compiled_patterns()) {
        for caps in re.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                matches.push(RefMatch {
                    reference: m.as_str().to_string(),
                    pattern: pattern.name,
                    confidence: pattern.confidence,
                });
            }
        }
    }
    matches
}

/// Scan a file for extension references. Best-effort: unreadable files yield
/// an empty set.
pub fn scan_file(path: &Path) -> BTreeSet<String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!("skipping unreadable file {}: {e}", path.display());
            return BTreeSet::new();
        }
    };
    scan_content(&content)
        .into_iter()
        .map(|m| m.reference)
        .collect()
}

// ---------------------------------------------------------------------------
// Plugin scanning
// ---------------------------------------------------------------------------

/// Discover all extensions in a single plugin directory.
///
/// Skills are directories under `skills/` containing a `SKILL.md` marker;
/// agents and commands are flat Markdown files under `agents/` and
/// `commands/`.
pub fn scan_plugin(plugin_path: &Path, plugin_name: &str) -> Vec<Extension> {
    let mut extensions = Vec::new();

    let skills_dir = plugin_path.join("skills");
    for entry in read_dir_sorted(&skills_dir) {
        if !entry.is_dir() {
            continue;
        }
        let marker = entry.join(crate::paths::SKILL_MARKER);
        if !marker.exists() {
            continue;
        }
        let name = file_name(&entry);
        extensions.push(Extension {
            plugin: plugin_name.to_string(),
            name,
            kind: ExtensionKind::Skill,
            references: scan_file(&marker),
            file_path: marker,
        });
    }

    let agents_dir = plugin_path.join("agents");
    for entry in read_dir_sorted(&agents_dir) {
        if entry.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let stem = file_stem(&entry);
        // some plugins name agents `name.agent.md`
        let name = stem.strip_suffix(".agent").unwrap_or(&stem).to_string();
        extensions.push(Extension {
            plugin: plugin_name.to_string(),
            name,
            kind: ExtensionKind::Agent,
            references: scan_file(&entry),
            file_path: entry,
        });
    }

    let commands_dir = plugin_path.join("commands");
    for entry in read_dir_sorted(&commands_dir) {
        if entry.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let name = file_stem(&entry);
        extensions.push(Extension {
            plugin: plugin_name.to_string(),
            name,
            kind: ExtensionKind::Command,
            references: scan_file(&entry),
            file_path: entry,
        });
    }

    extensions
}

/// Find all plugin roots in a plugin cache directory.
///
/// A plugin root is any directory with a `skills/`, `agents/`, or `commands/`
/// subdirectory. Cache layouts vary: `cache/plugin-name/` or
/// `cache/org/plugin-name/version/`; the plugin name is the second path
/// segment when nested, the first otherwise.
pub fn discover_plugin_roots(cache_dir: &Path) -> Vec<(String, PathBuf)> {
    let mut roots = Vec::new();
    if !cache_dir.exists() {
        return roots;
    }
    let mut stack = vec![cache_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in read_dir_sorted(&dir) {
            if !entry.is_dir() {
                continue;
            }
            let has_extensions = entry.join("skills").is_dir()
                || entry.join("agents").is_dir()
                || entry.join("commands").is_dir();
            if has_extensions {
                let rel: Vec<String> = entry
                    .strip_prefix(cache_dir)
                    .map(|p| {
                        p.components()
                            .map(|c| c.as_os_str().to_string_lossy().into_owned())
                            .collect()
                    })
                    .unwrap_or_default();
                let plugin_name = match rel.len() {
                    0 => continue,
                    1 => rel[0].clone(),
                    _ => rel[1].clone(),
                };
                roots.push((plugin_name, entry));
            } else {
                stack.push(entry);
            }
        }
    }
    roots.sort();
    roots
}

fn read_dir_sorted(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    entries.sort();
    entries
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
