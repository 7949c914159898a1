use crate::output::{print_json, print_table};
use plugsync_core::graph::DependencyGraph;
use plugsync_core::paths::Paths;
use std::path::Path;

pub fn run(root: &Path, extension: Option<&str>, json: bool) -> anyhow::Result<()> {
    let paths = Paths::new(root)?;
    let graph = DependencyGraph::scan_all(&paths.plugins_cache());

    if let Some(name) = extension {
        return show_closure(&graph, name, json);
    }

    if json {
        let extensions: Vec<_> = graph.extensions.values().collect();
        return print_json(&extensions);
    }

    let rows: Vec<Vec<String>> = graph
        .extensions
        .values()
        .map(|ext| {
            let deps = graph.dependencies_of(&ext.full_name());
            vec![
                ext.full_name(),
                ext.kind.to_string(),
                deps.into_iter().collect::<Vec<_>>().join(", "),
            ]
        })
        .collect();
    print_table(&["EXTENSION", "KIND", "DEPENDS ON"], rows);
    Ok(())
}

fn show_closure(graph: &DependencyGraph, name: &str, json: bool) -> anyhow::Result<()> {
    if !graph.extensions.contains_key(name) {
        anyhow::bail!("extension not found: {name}");
    }
    let dependencies: Vec<String> = graph.all_dependencies(name).into_iter().collect();
    let dependents: Vec<String> = graph.all_dependents(name).into_iter().collect();

    if json {
        return print_json(&serde_json::json!({
            "extension": name,
            "dependencies": dependencies,
            "dependents": dependents,
        }));
    }

    println!("{name}");
    println!("  depends on: {}", join_or_none(&dependencies));
    println!("  required by: {}", join_or_none(&dependents));
    Ok(())
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
