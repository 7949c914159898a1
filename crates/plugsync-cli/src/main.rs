mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    hook::HookSubcommand, queue::QueueSubcommand, retro::RetroSubcommand,
    roadmap::RoadmapSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "plugsync",
    about = "Sync agent plugin extensions, manage the project roadmap, and run session hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .agent_planning/ or .git/)
    #[arg(long, global = true, env = "PLUGSYNC_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync plugin extensions to the copilot directories
    Sync {
        /// Show what would be synced without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Regenerate the rule manifest from usage statistics
        #[arg(long)]
        generate_manifest: bool,
        /// Write a starter rule manifest and exit
        #[arg(long)]
        init: bool,
        /// Symlink whole skill directories instead of copying content
        #[arg(long)]
        symlinks: bool,
    },

    /// Remove stale managed targets left by earlier syncs
    Unsync,

    /// Show discovered extensions and their dependencies
    Graph {
        /// Show the dependency closure of one extension
        #[arg(long = "for")]
        extension: Option<String>,
    },

    /// Show skill usage statistics
    Usage {
        /// Maximum number of skills to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Manage the project roadmap
    Roadmap {
        #[command(subcommand)]
        subcommand: RoadmapSubcommand,
    },

    /// Record retrospective items
    Retro {
        #[command(subcommand)]
        subcommand: RetroSubcommand,
    },

    /// Command queue hook entry points (stdin JSON in, hook JSON out)
    Queue {
        #[command(subcommand)]
        subcommand: QueueSubcommand,
    },

    /// Session lifecycle hooks
    Hook {
        #[command(subcommand)]
        subcommand: HookSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Sync {
            dry_run,
            generate_manifest,
            init,
            symlinks,
        } => cmd::sync::run(&root, dry_run, generate_manifest, init, symlinks, cli.json),
        Commands::Unsync => cmd::unsync::run(&root, cli.json),
        Commands::Graph { extension } => cmd::graph::run(&root, extension.as_deref(), cli.json),
        Commands::Usage { limit } => cmd::usage::run(&root, limit, cli.json),
        Commands::Roadmap { subcommand } => cmd::roadmap::run(&root, subcommand, cli.json),
        Commands::Retro { subcommand } => cmd::retro::run(&root, subcommand),
        Commands::Queue { subcommand } => cmd::queue::run(&root, subcommand),
        Commands::Hook { subcommand } => cmd::hook::run(&root, subcommand),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
