use clap::Subcommand;
use plugsync_core::paths::Paths;
use plugsync_core::retro;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Subcommand)]
pub enum RetroSubcommand {
    /// Record a retrospective item
    Add {
        /// Item category: friction, success, confusion, observation, debt, tooling
        #[arg(long, short = 'c')]
        category: Option<String>,
        /// Item text
        #[arg(long, short = 't')]
        text: Option<String>,
        /// Who recorded it: user or agent
        #[arg(long, short = 's', default_value = "agent")]
        source: String,
        /// Free-form context note
        #[arg(long)]
        context: Option<String>,
        /// Read a JSON item from stdin instead of flags
        #[arg(long)]
        stdin: bool,
    },
}

#[derive(Deserialize)]
struct StdinItem {
    #[serde(default = "default_category")]
    category: String,
    #[serde(default)]
    text: String,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    context: Option<String>,
}

fn default_category() -> String {
    "observation".to_string()
}

fn default_source() -> String {
    "agent".to_string()
}

pub fn run(root: &Path, subcmd: RetroSubcommand) -> anyhow::Result<()> {
    let RetroSubcommand::Add {
        category,
        text,
        source,
        context,
        stdin,
    } = subcmd;

    let paths = match Paths::new(root) {
        Ok(p) => p,
        Err(e) => return fail(&e.to_string()),
    };

    let (category, text, source, context) = if stdin || (category.is_none() && text.is_none()) {
        let mut raw = String::new();
        if std::io::stdin().read_to_string(&mut raw).is_err() {
            return fail("failed to read stdin");
        }
        match serde_json::from_str::<StdinItem>(&raw) {
            Ok(item) => (item.category, item.text, item.source, item.context),
            Err(e) => return fail(&format!("invalid JSON input: {e}")),
        }
    } else {
        (
            category.unwrap_or_else(default_category),
            text.unwrap_or_default(),
            source,
            context,
        )
    };

    match retro::add_item(&paths, &category, &text, &source, context.as_deref()) {
        Ok(_) => {
            let total = retro::count_items(&paths);
            println!(
                "{}",
                serde_json::json!({
                    "success": true,
                    "category": category,
                    "total_items": total,
                })
            );
            Ok(())
        }
        Err(e) => fail(&e.to_string()),
    }
}

// Machine-readable failure: callers are agents and hooks, not humans.
fn fail(message: &str) -> anyhow::Result<()> {
    eprintln!("{}", serde_json::json!({"error": message}));
    std::process::exit(1);
}
