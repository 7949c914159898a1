use crate::output::print_json;
use plugsync_core::manifest::SyncManifest;
use plugsync_core::paths::Paths;
use plugsync_core::sync::{self, SyncOptions, SyncReport};
use std::path::Path;

pub fn run(
    root: &Path,
    dry_run: bool,
    generate_manifest: bool,
    init: bool,
    symlinks: bool,
    json: bool,
) -> anyhow::Result<()> {
    let paths = Paths::new(root)?;

    if init {
        return init_manifest(&paths, json);
    }

    let report = if symlinks {
        sync::run_symlinks(&paths)?
    } else {
        let opts = SyncOptions {
            dry_run,
            generate_manifest,
        };
        sync::run(&paths, &opts)?
    };

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn init_manifest(paths: &Paths, json: bool) -> anyhow::Result<()> {
    let path = paths.rule_manifest();
    if path.exists() {
        anyhow::bail!("rule manifest already exists: {}", path.display());
    }
    SyncManifest::template().save(&path)?;

    if json {
        return print_json(&serde_json::json!({
            "status": "initialized",
            "manifest": path.display().to_string(),
        }));
    }
    println!("Wrote starter manifest: {}", path.display());
    println!("Edit the syncRules list, then run `plugsync sync`.");
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.dry_run {
        println!("Would sync {} extension(s):", report.total);
        for name in &report.would_sync {
            println!("  {name}");
        }
        return;
    }
    println!(
        "Synced {} extension(s): {} written, {} removed",
        report.total, report.written, report.removed
    );
}
