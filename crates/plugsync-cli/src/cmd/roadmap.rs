use crate::output::{print_json, print_table};
use clap::Subcommand;
use plugsync_core::paths::Paths;
use plugsync_core::roadmap::{self, Roadmap};
use std::path::Path;

#[derive(Subcommand)]
pub enum RoadmapSubcommand {
    /// Show the roadmap
    Show,
    /// Add a single topic to a phase
    Add {
        /// Topic name (slugified)
        name: String,
        /// Target phase number
        #[arg(long, default_value = "1")]
        phase: u32,
        /// One-line summary
        #[arg(long)]
        summary: Option<String>,
        /// Parent epic
        #[arg(long)]
        epic: Option<String>,
    },
    /// Add several topics at once (semicolons, bullets, or numbered lists)
    BatchAdd {
        /// Topic list, e.g. "auth - P1 add login; caching - speed up reads"
        topics: String,
    },
    /// Migrate a narrative-format roadmap to the structured schema
    Migrate,
    /// Check whether a topic summary carries enough planning context
    Validate {
        /// The summary to check
        summary: String,
    },
}

pub fn run(root: &Path, subcmd: RoadmapSubcommand, json: bool) -> anyhow::Result<()> {
    let paths = Paths::new(root)?;
    match subcmd {
        RoadmapSubcommand::Show => show(&paths, json),
        RoadmapSubcommand::Add {
            name,
            phase,
            summary,
            epic,
        } => add(&paths, &name, phase, summary.as_deref(), epic.as_deref(), json),
        RoadmapSubcommand::BatchAdd { topics } => batch_add(&paths, &topics),
        RoadmapSubcommand::Migrate => migrate(&paths),
        RoadmapSubcommand::Validate { summary } => print_json(&roadmap::validate_context(&summary)),
    }
}

fn show(paths: &Paths, json: bool) -> anyhow::Result<()> {
    let roadmap = Roadmap::load(&paths.roadmap());

    if json {
        return print_json(&roadmap);
    }

    if roadmap.phases.is_empty() {
        println!("No roadmap found at {}", paths.roadmap().display());
        return Ok(());
    }

    for phase in &roadmap.phases {
        println!("Phase {}: {} [{}]", phase.number, phase.name, phase.status);
        if let Some(goal) = &phase.goal {
            println!("  Goal: {goal}");
        }
        let rows: Vec<Vec<String>> = phase
            .topics
            .iter()
            .map(|t| {
                vec![
                    t.name.clone(),
                    t.state.clone(),
                    t.summary.clone().unwrap_or_default(),
                ]
            })
            .collect();
        if rows.is_empty() {
            println!("  (no topics)");
        } else {
            print_table(&["TOPIC", "STATE", "SUMMARY"], rows);
        }
        println!();
    }
    Ok(())
}

fn add(
    paths: &Paths,
    name: &str,
    phase: u32,
    summary: Option<&str>,
    epic: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut roadmap = Roadmap::load(&paths.roadmap());
    let slug = roadmap.add_topic(paths, phase, name, summary, epic)?;
    roadmap.save(&paths.roadmap())?;

    if json {
        return print_json(&serde_json::json!({
            "status": "added",
            "topic": slug,
            "phase": phase,
        }));
    }
    println!("Added topic '{slug}' to phase {phase}");
    Ok(())
}

fn batch_add(paths: &Paths, topics: &str) -> anyhow::Result<()> {
    let report = roadmap::batch_add(paths, topics)?;
    print_json(&report)
}

fn migrate(paths: &Paths) -> anyhow::Result<()> {
    let path = paths.roadmap();
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => {
            return print_json(&serde_json::json!({"error": "no ROADMAP.md found"}));
        }
    };

    let (needed, reason) = roadmap::needs_migration(&content);
    if !needed {
        return print_json(&serde_json::json!({"status": "compliant", "reason": reason}));
    }

    // Keep the original next to the migrated file.
    let backup = path.with_file_name(format!("ROADMAP.md.backup-{}", roadmap::timestamp()));
    std::fs::copy(&path, &backup)?;

    let migrated = roadmap::migrate_narrative(&content)?;
    migrated.save(&path)?;

    let topics: usize = migrated.phases.iter().map(|p| p.topics.len()).sum();
    print_json(&serde_json::json!({
        "status": "migrated",
        "backup": backup.display().to_string(),
        "phases": migrated.phases.len(),
        "topics": topics,
    }))
}
