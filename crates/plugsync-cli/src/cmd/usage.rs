use crate::output::{print_json, print_table};
use plugsync_core::paths::Paths;
use plugsync_core::usage::UsageStats;
use std::path::Path;

pub fn run(root: &Path, limit: usize, json: bool) -> anyhow::Result<()> {
    let paths = Paths::new(root)?;
    let stats = UsageStats::load(&paths.claude_config());
    let top = stats.most_used(limit);

    if json {
        return print_json(&top);
    }

    if top.is_empty() {
        println!("No usage statistics recorded");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = top
        .iter()
        .map(|s| {
            vec![
                s.skill_name.clone(),
                s.usage_count.to_string(),
                format!("{}d ago", s.days_since_last_use()),
            ]
        })
        .collect();
    print_table(&["SKILL", "USES", "LAST USED"], rows);
    Ok(())
}
