use crate::error::{Result, SyncError};
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const PLANNING_DIR: &str = ".agent_planning";
pub const ROADMAP_FILE: &str = ".agent_planning/ROADMAP.md";
pub const RETRO_ITEMS_FILE: &str = ".agent_planning/retro/items.jsonl";
pub const QUEUE_PREFIX: &str = ".cmd-queue-";

pub const CLAUDE_DIR: &str = ".claude";
pub const CLAUDE_CONFIG_FILE: &str = ".claude.json";
pub const PLUGINS_CACHE_DIR: &str = ".claude/plugins/cache";
pub const INSTALLED_PLUGINS_FILE: &str = ".claude/plugins/installed_plugins.json";
pub const CLAUDE_SETTINGS_FILE: &str = ".claude/settings.json";

pub const COPILOT_DIR: &str = ".copilot";
pub const COPILOT_SKILLS_DIR: &str = ".copilot/skills";
pub const COPILOT_AGENTS_DIR: &str = ".copilot/agents";
pub const COPILOT_COMMANDS_DIR: &str = ".copilot/commands";
pub const STATE_MANIFEST_FILE: &str = ".copilot/claude-sync-manifest.json";
pub const RULE_MANIFEST_FILE: &str = ".copilot/sync-manifest.json";

pub const SKILL_MARKER: &str = "SKILL.md";

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// All filesystem roots the tool touches. Constructed once and passed down so
/// tests can point everything at temporary directories.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Project root — `.agent_planning/` lives here.
    pub root: PathBuf,
    /// Home directory — `.claude/` and `.copilot/` live here.
    pub home: PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let home = home::home_dir().ok_or(SyncError::HomeNotFound)?;
        Ok(Self::with_home(root, home))
    }

    pub fn with_home(root: impl Into<PathBuf>, home: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            home: home.into(),
        }
    }

    // -- project-rooted ----------------------------------------------------

    pub fn planning_dir(&self) -> PathBuf {
        self.root.join(PLANNING_DIR)
    }

    pub fn roadmap(&self) -> PathBuf {
        self.root.join(ROADMAP_FILE)
    }

    pub fn topic_dir(&self, slug: &str) -> PathBuf {
        self.planning_dir().join(slug)
    }

    pub fn retro_items(&self) -> PathBuf {
        self.root.join(RETRO_ITEMS_FILE)
    }

    pub fn queue(&self, session_id: &str) -> PathBuf {
        self.planning_dir().join(format!("{QUEUE_PREFIX}{session_id}"))
    }

    // -- home-rooted -------------------------------------------------------

    pub fn claude_config(&self) -> PathBuf {
        self.home.join(CLAUDE_CONFIG_FILE)
    }

    pub fn plugins_cache(&self) -> PathBuf {
        self.home.join(PLUGINS_CACHE_DIR)
    }

    pub fn installed_plugins(&self) -> PathBuf {
        self.home.join(INSTALLED_PLUGINS_FILE)
    }

    pub fn claude_settings(&self) -> PathBuf {
        self.home.join(CLAUDE_SETTINGS_FILE)
    }

    pub fn copilot_skills(&self) -> PathBuf {
        self.home.join(COPILOT_SKILLS_DIR)
    }

    pub fn copilot_agents(&self) -> PathBuf {
        self.home.join(COPILOT_AGENTS_DIR)
    }

    pub fn copilot_commands(&self) -> PathBuf {
        self.home.join(COPILOT_COMMANDS_DIR)
    }

    pub fn state_manifest(&self) -> PathBuf {
        self.home.join(STATE_MANIFEST_FILE)
    }

    pub fn rule_manifest(&self) -> PathBuf {
        self.home.join(RULE_MANIFEST_FILE)
    }
}

// ---------------------------------------------------------------------------
// Slug helpers
// ---------------------------------------------------------------------------

static NON_SLUG_RE: OnceLock<Regex> = OnceLock::new();
static DASH_RUN_RE: OnceLock<Regex> = OnceLock::new();

fn non_slug_re() -> &'static Regex {
    NON_SLUG_RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").unwrap())
}

fn dash_run_re() -> &'static Regex {
    DASH_RUN_RE.get_or_init(|| Regex::new(r"-+").unwrap())
}

/// Convert free text to a kebab-case slug.
pub fn to_kebab_case(text: &str) -> String {
    let lowered = text.to_lowercase().replace(['_', ' '], "-");
    let cleaned = non_slug_re().replace_all(&lowered, "");
    let collapsed = dash_run_re().replace_all(&cleaned, "-");
    collapsed.trim_matches('-').to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn kebab_case_conversion() {
        assert_eq!(to_kebab_case("Add User Auth"), "add-user-auth");
        assert_eq!(to_kebab_case("snake_case_name"), "snake-case-name");
        assert_eq!(to_kebab_case("already-kebab"), "already-kebab");
        assert_eq!(to_kebab_case("  weird!!chars  "), "weirdchars");
        assert_eq!(to_kebab_case("a -- b"), "a-b");
    }

    #[test]
    fn path_helpers() {
        let paths = Paths::with_home("/tmp/proj", "/tmp/home");
        assert_eq!(
            paths.roadmap(),
            Path::new("/tmp/proj/.agent_planning/ROADMAP.md")
        );
        assert_eq!(
            paths.queue("abc123"),
            Path::new("/tmp/proj/.agent_planning/.cmd-queue-abc123")
        );
        assert_eq!(
            paths.state_manifest(),
            Path::new("/tmp/home/.copilot/claude-sync-manifest.json")
        );
        assert_eq!(
            paths.plugins_cache(),
            Path::new("/tmp/home/.claude/plugins/cache")
        );
    }
}
