use crate::error::Result;
use crate::extension::{Extension, ExtensionKind};
use crate::frontmatter;
use crate::graph::DependencyGraph;
use crate::io::{ensure_dir, write_if_changed};
use crate::manifest::{RecordStatus, StateManifest, SyncManifest, SyncRecord};
use crate::name_map::{rewrite_references, NameMapper};
use crate::paths::Paths;
use crate::usage::UsageStats;
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Options / report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Show what would be synced without writing anything.
    pub dry_run: bool,
    /// Regenerate the rule manifest from usage statistics first.
    pub generate_manifest: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub total: usize,
    pub written: usize,
    pub removed: usize,
    /// Full names in the sync set, sorted. Populated for dry runs.
    pub would_sync: Vec<String>,
}

// ---------------------------------------------------------------------------
// Target layout
// ---------------------------------------------------------------------------

/// Where a synced extension lands, by category:
/// skills are directories with a `SKILL.md`, agents are `<name>.agent.md`
/// files, commands are flat `<name>.md` files.
pub fn target_path(paths: &Paths, kind: ExtensionKind, target_name: &str) -> PathBuf {
    match kind {
        ExtensionKind::Skill => paths
            .copilot_skills()
            .join(target_name)
            .join(crate::paths::SKILL_MARKER),
        ExtensionKind::Agent => paths
            .copilot_agents()
            .join(format!("{target_name}.agent.md")),
        ExtensionKind::Command => paths.copilot_commands().join(format!("{target_name}.md")),
    }
}

/// The filesystem node removed during cleanup: the whole skill directory,
/// or the single file for agents and commands.
fn cleanup_path(paths: &Paths, kind: ExtensionKind, target_name: &str) -> PathBuf {
    match kind {
        ExtensionKind::Skill => paths.copilot_skills().join(target_name),
        ExtensionKind::Agent => paths
            .copilot_agents()
            .join(format!("{target_name}.agent.md")),
        ExtensionKind::Command => paths.copilot_commands().join(format!("{target_name}.md")),
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Sync one extension: read the source, rewrite cross-references and
/// frontmatter, and write the target only if the bytes differ.
/// Returns `true` if the target was written.
pub fn sync_extension(
    paths: &Paths,
    ext: &Extension,
    mapper: &mut NameMapper,
    state: &mut StateManifest,
) -> Result<bool> {
    let target_name = mapper.register(&ext.full_name());
    let target = target_path(paths, ext.kind, &target_name);

    let content = std::fs::read_to_string(&ext.file_path)?;
    let rewritten = rewrite_references(&content, mapper);
    let normalized = frontmatter::normalize(&rewritten, &target_name);

    if let Some(parent) = target.parent() {
        ensure_dir(parent)?;
    }
    let written = write_if_changed(&target, normalized.as_bytes())?;

    state.category_mut(ext.kind).insert(
        target_name,
        SyncRecord {
            source: ext.file_path.display().to_string(),
            plugin: ext.plugin.clone(),
            status: RecordStatus::Active,
        },
    );
    Ok(written)
}

/// Run the full sync: scan, select, reconcile, clean up.
///
/// The previous state manifest drives cleanup: entries no longer in the
/// active set are kept as `removed` tombstones, and their targets are
/// deleted from disk only because the manifest records them as ours.
/// Unmanaged files are never touched.
pub fn run(paths: &Paths, opts: &SyncOptions) -> Result<SyncReport> {
    let usage = UsageStats::load(&paths.claude_config());
    let graph = DependencyGraph::scan_all(&paths.plugins_cache());

    let rule_path = paths.rule_manifest();
    let mut rules = if opts.generate_manifest || !rule_path.exists() {
        let generated = SyncManifest::from_usage(&usage, &graph, 10, 3);
        generated.save(&rule_path)?;
        tracing::debug!("generated rule manifest with {} rules", generated.sync_rules.len());
        generated
    } else {
        SyncManifest::load(&rule_path)?
    };

    let sync_set = rules.extensions_to_sync(&usage, &graph);
    let would_sync: Vec<String> = sync_set.iter().map(|e| e.full_name()).collect();

    if opts.dry_run {
        return Ok(SyncReport {
            dry_run: true,
            total: sync_set.len(),
            would_sync,
            ..Default::default()
        });
    }

    let previous = StateManifest::load(&paths.state_manifest());
    let mut next = StateManifest {
        last_sync: Some(Utc::now()),
        ..Default::default()
    };

    // Pre-register every name so mapping is consistent across the whole run
    // regardless of processing order.
    let mut mapper = NameMapper::new();
    for ext in &sync_set {
        mapper.register(&ext.full_name());
    }

    let mut written = 0;
    for ext in &sync_set {
        if sync_extension(paths, ext, &mut mapper, &mut next)? {
            written += 1;
        }
    }

    let removed = reconcile_previous(paths, &previous, &mut next, rules.options.remove_stale)?;

    next.save(&paths.state_manifest())?;
    rules.metadata.last_sync = Some(Utc::now());
    rules.save(&rule_path)?;

    tracing::debug!(
        "synced {} extensions ({written} written, {removed} removed)",
        sync_set.len()
    );

    Ok(SyncReport {
        dry_run: false,
        total: sync_set.len(),
        written,
        removed,
        would_sync,
    })
}

/// Carry tombstones forward and delete stale managed targets.
fn reconcile_previous(
    paths: &Paths,
    previous: &StateManifest,
    next: &mut StateManifest,
    remove_stale: bool,
) -> Result<usize> {
    let mut removed = 0;
    for kind in [
        ExtensionKind::Skill,
        ExtensionKind::Agent,
        ExtensionKind::Command,
    ] {
        let next_names: BTreeSet<String> = next.category(kind).keys().cloned().collect();
        let stale: Vec<(String, SyncRecord)> = previous
            .category(kind)
            .iter()
            .filter(|(name, _)| !next_names.contains(*name))
            .map(|(n, r)| (n.clone(), r.clone()))
            .collect();

        for (name, record) in stale {
            let was_active = record.status == RecordStatus::Active;
            next.category_mut(kind).insert(
                name.clone(),
                SyncRecord {
                    status: RecordStatus::Removed,
                    ..record
                },
            );
            if remove_stale && was_active {
                // Managed by us: the previous manifest recorded it as active.
                if remove_target(&cleanup_path(paths, kind, &name))? {
                    removed += 1;
                }
            }
        }
    }
    Ok(removed)
}

fn remove_target(path: &Path) -> Result<bool> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(false),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Unsync
// ---------------------------------------------------------------------------

/// Remove every managed target whose manifest status is not active.
/// Files the manifest does not record are left alone.
pub fn unsync(paths: &Paths) -> Result<usize> {
    let manifest = StateManifest::load(&paths.state_manifest());
    let mut removed = 0;

    for kind in [
        ExtensionKind::Skill,
        ExtensionKind::Agent,
        ExtensionKind::Command,
    ] {
        let names: Vec<String> = manifest
            .category(kind)
            .iter()
            .filter(|(_, r)| r.status != RecordStatus::Active)
            .map(|(n, _)| n.clone())
            .collect();
        for name in names {
            if remove_target(&cleanup_path(paths, kind, &name))? {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Symlink mode
// ---------------------------------------------------------------------------

/// Create a symlink, replacing an existing one that points elsewhere.
/// Returns `true` if a new link was created.
#[cfg(unix)]
pub fn create_symlink(source: &Path, target: &Path) -> Result<bool> {
    if let Ok(meta) = std::fs::symlink_metadata(target) {
        if meta.file_type().is_symlink() {
            if let (Ok(a), Ok(b)) = (std::fs::canonicalize(target), std::fs::canonicalize(source)) {
                if a == b {
                    return Ok(false);
                }
            }
        }
        remove_target(target)?;
    }
    std::os::unix::fs::symlink(source, target)?;
    Ok(true)
}

/// Symlink-based sync: link whole skill directories and agent files from
/// enabled plugins into the target directories, with the same
/// manifest-driven stale cleanup as content mode.
#[cfg(unix)]
pub fn run_symlinks(paths: &Paths) -> Result<SyncReport> {
    ensure_dir(&paths.copilot_skills())?;
    ensure_dir(&paths.copilot_agents())?;

    let plugins = installed_plugin_paths(paths)?;
    let previous = StateManifest::load(&paths.state_manifest());
    let mut next = StateManifest {
        last_sync: Some(Utc::now()),
        ..Default::default()
    };

    let mut written = 0;
    let mut total = 0;
    for (plugin_name, plugin_path) in &plugins {
        for ext in crate::extension::scan_plugin(plugin_path, plugin_name) {
            let target_name = format!("{}-{}", plugin_name, ext.name);
            let (source, link) = match ext.kind {
                ExtensionKind::Skill => (
                    ext.file_path.parent().unwrap_or(&ext.file_path).to_path_buf(),
                    paths.copilot_skills().join(&target_name),
                ),
                ExtensionKind::Agent => (
                    ext.file_path.clone(),
                    paths
                        .copilot_agents()
                        .join(format!("{target_name}.agent.md")),
                ),
                // commands are content-synced only
                ExtensionKind::Command => continue,
            };
            if create_symlink(&source, &link)? {
                written += 1;
            }
            total += 1;
            next.category_mut(ext.kind).insert(
                target_name,
                SyncRecord {
                    source: source.display().to_string(),
                    plugin: plugin_name.clone(),
                    status: RecordStatus::Active,
                },
            );
        }
    }

    let removed = reconcile_previous(paths, &previous, &mut next, true)?;
    next.save(&paths.state_manifest())?;

    Ok(SyncReport {
        dry_run: false,
        total,
        written,
        removed,
        would_sync: Vec::new(),
    })
}

/// Installed plugin roots, filtered to enabled plugins when the settings
/// file lists any.
fn installed_plugin_paths(paths: &Paths) -> Result<Vec<(String, PathBuf)>> {
    let installed_path = paths.installed_plugins();
    if !installed_path.exists() {
        // fall back to scanning the cache directly
        return Ok(crate::extension::discover_plugin_roots(&paths.plugins_cache()));
    }

    let data = std::fs::read_to_string(&installed_path)?;
    let value: serde_json::Value = serde_json::from_str(&data)?;
    let enabled = enabled_plugins(paths);

    let mut result = Vec::new();
    if let Some(plugins) = value.get("plugins").and_then(|v| v.as_object()) {
        for (key, installs) in plugins {
            if let Some(ref enabled) = enabled {
                if !enabled.contains(key) {
                    continue;
                }
            }
            let plugin_name = key.split('@').next().unwrap_or(key).to_string();
            // first entry is the most recent installation
            let install_path = installs
                .as_array()
                .and_then(|a| a.first())
                .and_then(|i| i.get("installPath"))
                .and_then(|p| p.as_str());
            if let Some(p) = install_path {
                let path = PathBuf::from(p);
                if path.exists() {
                    result.push((plugin_name, path));
                }
            }
        }
    }
    result.sort();
    Ok(result)
}

/// Enabled plugin keys from settings.json. `None` means no settings file,
/// which enables everything.
fn enabled_plugins(paths: &Paths) -> Option<BTreeSet<String>> {
    let data = std::fs::read_to_string(paths.claude_settings()).ok()?;
    let value: serde_json::Value = serde_json::from_str(&data).ok()?;
    let map = value.get("enabledPlugins")?.as_object()?;
    Some(
        map.iter()
            .filter(|(_, v)| v.as_bool() == Some(true))
            .map(|(k, _)| k.clone())
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Lay out a fake home with a plugin cache, a rule manifest selecting
    /// everything in the `do` plugin, and usage stats.
    fn fixture() -> (TempDir, Paths) {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let root = dir.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        let paths = Paths::with_home(&root, &home);

        let plugin = home.join(".claude/plugins/cache/loom99/do/0.5.23");
        std::fs::create_dir_all(plugin.join("skills/plan")).unwrap();
        std::fs::write(
            plugin.join("skills/plan/SKILL.md"),
            "---\nname: plan\ndescription: plan work\n---\nUse /do:it next.\n",
        )
        .unwrap();
        std::fs::create_dir_all(plugin.join("skills/it")).unwrap();
        std::fs::write(
            plugin.join("skills/it/SKILL.md"),
            "---\nname: it\ndescription: implement\n---\nJust do it.\n",
        )
        .unwrap();
        std::fs::create_dir_all(plugin.join("agents")).unwrap();
        std::fs::write(
            plugin.join("agents/evaluator.md"),
            "---\nname: evaluator\n---\nEvaluate.\n",
        )
        .unwrap();

        let mut rules = SyncManifest::default();
        rules.add_rule(crate::manifest::SyncRule {
            extension: "do:plan".into(),
            include_dependencies: true,
            priority: 10,
            notes: String::new(),
        });
        rules.add_rule(crate::manifest::SyncRule {
            extension: "do:evaluator".into(),
            include_dependencies: false,
            priority: 5,
            notes: String::new(),
        });
        rules.save(&paths.rule_manifest()).unwrap();

        (dir, paths)
    }

    #[test]
    fn sync_writes_targets_and_manifest() {
        let (_dir, paths) = fixture();
        let report = run(&paths, &SyncOptions::default()).unwrap();

        // do-plan plus its /do:it dependency plus the evaluator agent
        assert_eq!(report.total, 3);
        assert!(paths.copilot_skills().join("do-plan/SKILL.md").exists());
        assert!(paths.copilot_skills().join("do-it/SKILL.md").exists());
        assert!(paths.copilot_agents().join("do-evaluator.agent.md").exists());

        let state = StateManifest::load(&paths.state_manifest());
        assert_eq!(state.active_names(ExtensionKind::Skill).len(), 2);
        assert_eq!(state.active_names(ExtensionKind::Agent).len(), 1);
        assert!(state.last_sync.is_some());
    }

    #[test]
    fn sync_rewrites_references_and_frontmatter() {
        let (_dir, paths) = fixture();
        run(&paths, &SyncOptions::default()).unwrap();

        let content =
            std::fs::read_to_string(paths.copilot_skills().join("do-plan/SKILL.md")).unwrap();
        assert!(content.contains("name: do-plan"));
        assert!(content.contains("skill do-it"));
        assert!(!content.contains("/do:it"));
    }

    #[test]
    fn second_run_is_idempotent() {
        let (_dir, paths) = fixture();
        let first = run(&paths, &SyncOptions::default()).unwrap();
        assert_eq!(first.written, 3);

        let before = StateManifest::load(&paths.state_manifest());
        let second = run(&paths, &SyncOptions::default()).unwrap();
        assert_eq!(second.written, 0, "no source changes, no writes");
        assert_eq!(second.removed, 0);

        let after = StateManifest::load(&paths.state_manifest());
        assert_eq!(
            before.active_names(ExtensionKind::Skill),
            after.active_names(ExtensionKind::Skill)
        );
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (_dir, paths) = fixture();
        let report = run(
            &paths,
            &SyncOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.would_sync.len(), 3);
        assert!(!paths.copilot_skills().exists());
        assert!(!paths.state_manifest().exists());
    }

    #[test]
    fn dropped_extension_is_tombstoned_and_deleted() {
        let (_dir, paths) = fixture();
        run(&paths, &SyncOptions::default()).unwrap();

        // Drop the evaluator rule and resync.
        let mut rules = SyncManifest::load(&paths.rule_manifest()).unwrap();
        assert!(rules.remove_rule("do:evaluator"));
        rules.save(&paths.rule_manifest()).unwrap();

        let report = run(&paths, &SyncOptions::default()).unwrap();
        assert_eq!(report.removed, 1);
        assert!(!paths.copilot_agents().join("do-evaluator.agent.md").exists());

        // Tombstone retained for auditability.
        let state = StateManifest::load(&paths.state_manifest());
        assert_eq!(
            state.agents.get("do-evaluator").unwrap().status,
            RecordStatus::Removed
        );
    }

    #[test]
    fn unmanaged_files_are_never_deleted() {
        let (_dir, paths) = fixture();
        run(&paths, &SyncOptions::default()).unwrap();

        // Another tool's agent file sits in the same directory.
        let foreign = paths.copilot_agents().join("user-own.agent.md");
        std::fs::write(&foreign, "mine").unwrap();

        let mut rules = SyncManifest::load(&paths.rule_manifest()).unwrap();
        rules.remove_rule("do:evaluator");
        rules.save(&paths.rule_manifest()).unwrap();
        run(&paths, &SyncOptions::default()).unwrap();

        assert!(foreign.exists(), "unmanaged file must survive cleanup");
    }

    #[test]
    fn tombstones_survive_subsequent_runs() {
        let (_dir, paths) = fixture();
        run(&paths, &SyncOptions::default()).unwrap();

        let mut rules = SyncManifest::load(&paths.rule_manifest()).unwrap();
        rules.remove_rule("do:evaluator");
        rules.save(&paths.rule_manifest()).unwrap();
        run(&paths, &SyncOptions::default()).unwrap();
        run(&paths, &SyncOptions::default()).unwrap();

        let state = StateManifest::load(&paths.state_manifest());
        assert_eq!(
            state.agents.get("do-evaluator").unwrap().status,
            RecordStatus::Removed
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_mode_links_and_cleans() {
        let (_dir, paths) = fixture();
        let report = run_symlinks(&paths).unwrap();
        assert_eq!(report.written, 3);

        let link = paths.copilot_skills().join("do-plan");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());

        // second run changes nothing
        let second = run_symlinks(&paths).unwrap();
        assert_eq!(second.written, 0);
    }

    #[cfg(unix)]
    #[test]
    fn create_symlink_replaces_wrong_target() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        let link = dir.path().join("link");

        assert!(create_symlink(&a, &link).unwrap());
        assert!(!create_symlink(&a, &link).unwrap());
        assert!(create_symlink(&b, &link).unwrap());
        assert_eq!(std::fs::canonicalize(&link).unwrap(), std::fs::canonicalize(&b).unwrap());
    }
}
