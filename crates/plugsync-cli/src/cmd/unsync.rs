use crate::output::print_json;
use plugsync_core::paths::Paths;
use plugsync_core::sync;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let paths = Paths::new(root)?;
    let removed = sync::unsync(&paths)?;

    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    println!("Removed {removed} managed target(s)");
    Ok(())
}
