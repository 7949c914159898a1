use clap::Subcommand;
use plugsync_core::hooks;
use plugsync_core::paths::Paths;
use std::path::Path;

#[derive(Subcommand)]
pub enum HookSubcommand {
    /// SessionStart hook: initialize the issue tracker and inject context
    SessionStart,
}

pub fn run(root: &Path, subcmd: HookSubcommand) -> anyhow::Result<()> {
    let HookSubcommand::SessionStart = subcmd;

    // Fail open: a hook failure must never break the session.
    let Ok(paths) = Paths::new(root) else {
        return Ok(());
    };
    if let Some(output) = hooks::session_start(&paths) {
        println!("{output}");
    }
    Ok(())
}
