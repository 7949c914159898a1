use clap::Subcommand;
use plugsync_core::hooks;
use plugsync_core::paths::Paths;
use std::io::Read;
use std::path::Path;

#[derive(Subcommand)]
pub enum QueueSubcommand {
    /// UserPromptSubmit hook: run the first command now, queue the rest
    Parse,
    /// Stop hook: replay the next queued command, or allow the stop
    Pop,
}

pub fn run(root: &Path, subcmd: QueueSubcommand) -> anyhow::Result<()> {
    // Hooks fail open: any setup problem becomes a pass-through, never a
    // non-zero exit that would block the host.
    let paths = match Paths::new(root) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("queue hook: {e}");
            if matches!(subcmd, QueueSubcommand::Parse) {
                println!("{}", serde_json::json!({"result": "continue"}));
            }
            return Ok(());
        }
    };

    let mut raw = String::new();
    let _ = std::io::stdin().read_to_string(&mut raw);

    match subcmd {
        QueueSubcommand::Parse => {
            println!("{}", hooks::prompt_submit(&paths, &raw));
        }
        QueueSubcommand::Pop => {
            if let Some(output) = hooks::stop(&paths, &raw) {
                println!("{output}");
            }
        }
    }
    Ok(())
}
