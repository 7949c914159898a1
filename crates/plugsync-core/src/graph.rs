use crate::extension::{discover_plugin_roots, scan_plugin, Extension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// DependencyGraph
// ---------------------------------------------------------------------------

/// Cross-reference graph between extensions, keyed by full name.
///
/// Built fresh on each scan; never persisted.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    pub extensions: BTreeMap<String, Extension>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_extension(&mut self, extension: Extension) {
        let full_name = extension.full_name();
        self.dependencies.entry(full_name.clone()).or_default();
        self.dependents.entry(full_name.clone()).or_default();
        self.extensions.insert(full_name, extension);
    }

    pub fn add_dependency(&mut self, from: &str, to: &str) {
        self.dependencies
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.dependents
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// All transitive dependencies of `name`. Cycles are tolerated: the
    /// visited set breaks recursion and the starting node is never included
    /// in its own closure.
    pub fn all_dependencies(&self, name: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        self.walk(name, &self.dependencies, &mut visited);
        visited.remove(name);
        visited
    }

    /// All extensions that transitively reference `name`.
    pub fn all_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        self.walk(name, &self.dependents, &mut visited);
        visited.remove(name);
        visited
    }

    fn walk(
        &self,
        name: &str,
        edges: &BTreeMap<String, BTreeSet<String>>,
        visited: &mut BTreeSet<String>,
    ) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(next) = edges.get(name) {
            for n in next {
                self.walk(n, edges, visited);
            }
        }
    }

    /// The complete set of extensions to sync together: the requested names
    /// plus their transitive dependencies. Names without a known extension
    /// are dropped.
    pub fn sync_set(&self, names: &[String]) -> BTreeSet<Extension> {
        let mut wanted: BTreeSet<String> = names.iter().cloned().collect();
        for name in names {
            wanted.extend(self.all_dependencies(name));
        }
        wanted
            .into_iter()
            .filter_map(|n| self.extensions.get(&n).cloned())
            .collect()
    }

    /// Resolve a raw textual reference to a known full name.
    ///
    /// Priority: already-namespaced references verbatim, then the current
    /// plugin's namespace, then a bare lookup, then a suffix fuzzy match.
    /// Unresolvable references return `None` and are dropped by the caller.
    pub fn resolve_reference(&self, reference: &str, current_plugin: &str) -> Option<String> {
        if reference.contains(':') {
            return Some(reference.to_string());
        }

        let namespaced = format!("{current_plugin}:{reference}");
        if self.extensions.contains_key(&namespaced) {
            return Some(namespaced);
        }

        if self.extensions.contains_key(reference) {
            return Some(reference.to_string());
        }

        let colon_suffix = format!(":{reference}");
        let dash_suffix = format!("-{reference}");
        self.extensions
            .keys()
            .find(|k| k.ends_with(&colon_suffix) || k.ends_with(&dash_suffix))
            .cloned()
    }

    /// Scan every plugin under `cache_dir` and build the unified graph.
    pub fn scan_all(cache_dir: &Path) -> Self {
        let mut graph = Self::new();

        let roots = discover_plugin_roots(cache_dir);
        let mut scanned = Vec::new();
        for (plugin_name, plugin_path) in &roots {
            let extensions = scan_plugin(plugin_path, plugin_name);
            for ext in &extensions {
                graph.add_extension(ext.clone());
            }
            scanned.push((plugin_name.clone(), extensions));
        }

        // Edges are resolved after all plugins are registered so that
        // cross-plugin references land.
        for (plugin_name, extensions) in scanned {
            for ext in extensions {
                let from = ext.full_name();
                for reference in &ext.references {
                    if let Some(to) = graph.resolve_reference(reference, &plugin_name) {
                        if to != from {
                            graph.add_dependency(&from, &to);
                        }
                    }
                }
            }
        }

        tracing::debug!(
            "scanned {} plugins, {} extensions",
            roots.len(),
            graph.extensions.len()
        );
        graph
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionKind;
    use std::path::PathBuf;

    fn ext(plugin: &str, name: &str) -> Extension {
        Extension {
            plugin: plugin.to_string(),
            name: name.to_string(),
            kind: ExtensionKind::Skill,
            file_path: PathBuf::from(format!("/plugins/{plugin}/{name}.md")),
            references: BTreeSet::new(),
        }
    }

    fn graph_abc() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.add_extension(ext("p", "a"));
        g.add_extension(ext("p", "b"));
        g.add_extension(ext("p", "c"));
        g.add_dependency("p:a", "p:b");
        g.add_dependency("p:b", "p:c");
        g
    }

    #[test]
    fn transitive_dependencies() {
        let g = graph_abc();
        let deps = g.all_dependencies("p:a");
        assert_eq!(
            deps,
            ["p:b", "p:c"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn cycle_terminates() {
        let mut g = graph_abc();
        g.add_dependency("p:c", "p:a");
        let deps = g.all_dependencies("p:a");
        assert_eq!(
            deps,
            ["p:b", "p:c"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn transitive_dependents() {
        let g = graph_abc();
        let deps = g.all_dependents("p:c");
        assert_eq!(
            deps,
            ["p:a", "p:b"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn sync_set_includes_closure() {
        let g = graph_abc();
        let set = g.sync_set(&["p:a".to_string()]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn sync_set_drops_unknown_names() {
        let g = graph_abc();
        let set = g.sync_set(&["p:a".to_string(), "ghost:none".to_string()]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn resolve_namespaced_verbatim() {
        let g = graph_abc();
        assert_eq!(
            g.resolve_reference("other:thing", "p"),
            Some("other:thing".to_string())
        );
    }

    #[test]
    fn resolve_prefers_current_plugin() {
        let g = graph_abc();
        assert_eq!(g.resolve_reference("b", "p"), Some("p:b".to_string()));
    }

    #[test]
    fn resolve_suffix_fuzzy_match() {
        let mut g = DependencyGraph::new();
        g.add_extension(ext("do", "project-evaluator"));
        assert_eq!(
            g.resolve_reference("evaluator", "other"),
            Some("do:project-evaluator".to_string())
        );
    }

    #[test]
    fn resolve_unknown_is_none() {
        let g = graph_abc();
        assert_eq!(g.resolve_reference("nothing", "p"), None);
    }
}
