use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Maximum length for target platform skill names.
pub const MAX_NAME_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

static NON_NAME_RE: OnceLock<Regex> = OnceLock::new();
static DASH_RUN_RE: OnceLock<Regex> = OnceLock::new();

fn non_name_re() -> &'static Regex {
    NON_NAME_RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").unwrap())
}

fn dash_run_re() -> &'static Regex {
    DASH_RUN_RE.get_or_init(|| Regex::new(r"-+").unwrap())
}

/// Transform a namespaced extension name into a target-platform-safe
/// identifier: `do:plan` becomes `do-plan`.
///
/// The output is always lowercase, matches `^[a-z0-9-]*$`, never starts or
/// ends with `-`, and is at most [`MAX_NAME_LEN`] characters.
pub fn normalize(name: &str) -> String {
    let name = name.trim_start_matches('/').replace(':', "-").to_lowercase();
    let name = non_name_re().replace_all(&name, "-");
    let name = dash_run_re().replace_all(&name, "-");
    let name = name.trim_matches('-');
    let mut out: String = name.chars().take(MAX_NAME_LEN).collect();
    while out.ends_with('-') {
        out.pop();
    }
    out
}

// ---------------------------------------------------------------------------
// NameMapper
// ---------------------------------------------------------------------------

/// Bidirectional name table for one sync run. Every source name maps to one
/// stable target name; collisions get an incrementing numeric suffix.
#[derive(Debug, Default)]
pub struct NameMapper {
    canonical: BTreeMap<String, String>,
    reverse: BTreeMap<String, String>,
}

impl NameMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source name and return its canonical target name.
    /// Registering the same name again returns the existing mapping.
    pub fn register(&mut self, source_name: &str) -> String {
        if let Some(existing) = self.canonical.get(source_name) {
            return existing.clone();
        }

        let base = normalize(source_name);
        let mut target = base.clone();
        let mut counter = 2;
        while self
            .reverse
            .get(&target)
            .is_some_and(|owner| owner != source_name)
        {
            target = format!("{base}-{counter}");
            counter += 1;
        }

        self.canonical
            .insert(source_name.to_string(), target.clone());
        self.reverse.insert(target.clone(), source_name.to_string());
        target
    }

    /// Target name for a source name, auto-registering unseen names.
    pub fn target_name(&mut self, source_name: &str) -> String {
        self.register(source_name)
    }

    /// Reverse lookup; returns the input when the target name is unknown.
    pub fn source_name(&self, target_name: &str) -> String {
        self.reverse
            .get(target_name)
            .cloned()
            .unwrap_or_else(|| target_name.to_string())
    }
}

// ---------------------------------------------------------------------------
// ReferenceRewriter
// ---------------------------------------------------------------------------

static SLASH_CMD_RE: OnceLock<Regex> = OnceLock::new();
static SKILL_CALL_RE: OnceLock<Regex> = OnceLock::new();
static SKILL_WORD_RE: OnceLock<Regex> = OnceLock::new();
static TYPED_REF_RE: OnceLock<Regex> = OnceLock::new();

fn slash_cmd_re() -> &'static Regex {
    SLASH_CMD_RE.get_or_init(|| Regex::new(r"/([\w-]+):([\w-]+)").unwrap())
}

fn skill_call_re() -> &'static Regex {
    SKILL_CALL_RE.get_or_init(|| Regex::new(r#"Skill\(["']([^"']+)["']\)"#).unwrap())
}

fn skill_word_re() -> &'static Regex {
    SKILL_WORD_RE.get_or_init(|| Regex::new(r"\bskill\s+([\w-]+):([\w-]+)").unwrap())
}

fn typed_ref_re() -> &'static Regex {
    TYPED_REF_RE
        .get_or_init(|| Regex::new(r#"(subagent_type|agent_type)=["']([^"']+)["']"#).unwrap())
}

/// Rewrite all extension references in `content` to their canonical target
/// names.
///
/// Slash commands become `skill <name>` invocations since the target
/// platform has no slash-command syntax. Each pattern's matches are replaced
/// in reverse order so earlier byte offsets stay valid.
pub fn rewrite_references(content: &str, mapper: &mut NameMapper) -> String {
    let mut out = content.to_string();

    out = rewrite_pattern(&out, slash_cmd_re(), |caps, mapper| {
        let full = format!("{}:{}", &caps[1], &caps[2]);
        format!("skill {}", mapper.target_name(&full))
    }, mapper);

    out = rewrite_pattern(&out, skill_call_re(), |caps, mapper| {
        format!("Skill(\"{}\")", mapper.target_name(&caps[1]))
    }, mapper);

    out = rewrite_pattern(&out, skill_word_re(), |caps, mapper| {
        let full = format!("{}:{}", &caps[1], &caps[2]);
        format!("skill {}", mapper.target_name(&full))
    }, mapper);

    out = rewrite_pattern(&out, typed_ref_re(), |caps, mapper| {
        format!("{}=\"{}\"", &caps[1], mapper.target_name(&caps[2]))
    }, mapper);

    out
}

fn rewrite_pattern(
    content: &str,
    re: &Regex,
    build: impl Fn(&regex::Captures<'_>, &mut NameMapper) -> String,
    mapper: &mut NameMapper,
) -> String {
    let matches: Vec<(usize, usize, String)> = re
        .captures_iter(content)
        .map(|caps| {
            let m = caps.get(0).unwrap();
            (m.start(), m.end(), build(&caps, mapper))
        })
        .collect();

    let mut out = content.to_string();
    for (start, end, replacement) in matches.into_iter().rev() {
        out.replace_range(start..end, &replacement);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
