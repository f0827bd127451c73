//! Import resolution.
//!
//! Maps the literal path of an `import` statement to the URI of a known
//! workspace file. Six strategies are tried in order, first hit wins:
//!
//! 1. direct suffix match against known URIs;
//! 2. relative to the importing file's directory;
//! 3. under a configured import path;
//! 4. under a workspace root;
//! 5. under a derived proto root (any ancestor directory of a known file);
//! 6. `"/" + import` appearing anywhere in a known URI.
//!
//! Hits are cached under the key described on
//! [`ResolutionKey`](crate::workspace): by path alone for imports with a
//! directory component, per importing file for bare filenames. The inverse
//! direction — which path should a user write to import a given file —
//! lives here too.

use itertools::Itertools;
use log::debug;

use crate::uri::{
    basename, canonicalize_path, dirname, forward_relative, join_path, normalize_uri,
    traversal_relative, uri_path,
};
use crate::workspace::{ResolutionKey, Workspace};

/// The namespaces whose canonical import path never depends on where a
/// copy of the file happens to live.
const GOOGLE_NAMESPACES: &[&str] = &[
    "google/protobuf/",
    "google/api/",
    "google/rpc/",
    "google/type/",
];

impl Workspace {
    /// Resolves the literal `import_path` as written in `source_uri`.
    ///
    /// Consults the cache populated during mutations; a miss recomputes
    /// from scratch without writing the cache, so queries stay read-only.
    pub fn resolve_import_to_uri(&self, source_uri: &str, import_path: &str) -> Option<String> {
        let source_uri = normalize_uri(source_uri);
        let key = ResolutionKey::new(&source_uri, import_path);
        if let Some(hit) = self.resolution_cache().get(&key) {
            return Some(hit.clone());
        }
        self.run_import_strategies(&source_uri, import_path)
    }

    /// Resolves every still-unresolved import in the workspace and records
    /// the hits. Called at the end of each mutation, which both binds the
    /// mutated file's imports and lets a newly added file satisfy imports
    /// recorded before it existed.
    pub(crate) fn bind_pending_imports(&mut self) {
        let mut pending: Vec<(ResolutionKey, String, String)> = Vec::new();
        for (uri, file) in self.files_map() {
            for import in &file.imports {
                let key = ResolutionKey::new(uri, &import.path);
                if !self.resolution_cache().contains_key(&key) {
                    pending.push((key, uri.clone(), import.path.clone()));
                }
            }
        }
        for (key, source_uri, import_path) in pending {
            if let Some(target) = self.run_import_strategies(&source_uri, &import_path) {
                debug!("bound import \"{import_path}\" of {source_uri} -> {target}");
                self.resolution_cache_mut().insert(key, target);
            }
        }
    }

    fn run_import_strategies(&self, source_uri: &str, import_path: &str) -> Option<String> {
        let import = self.apply_path_mappings(import_path);
        let import = import.as_str();
        if import.is_empty() {
            return None;
        }

        let suffix = format!("/{import}");
        let bare = !import.contains('/');

        // 1. Direct suffix match.
        for (uri, path) in self.known_paths() {
            if path == import
                || path.ends_with(&suffix)
                || (bare && basename(&path) == import)
            {
                return Some(uri);
            }
        }

        // 2. Relative to the importing file's directory.
        let source_dir = dirname(uri_path(source_uri)).to_string();
        let relative = canonicalize_path(&join_path(&source_dir, import));
        for (uri, path) in self.known_paths() {
            if path == relative {
                return Some(uri);
            }
        }

        // 3–5. Rooted under configured import paths, workspace roots, then
        // derived proto roots.
        for root in self.import_paths_list() {
            if let Some(uri) = self.rooted_match(root, import) {
                return Some(uri);
            }
        }
        for root in self.workspace_roots_list() {
            if let Some(uri) = self.rooted_match(root, import) {
                return Some(uri);
            }
        }
        for root in self.derived_proto_roots() {
            if let Some(uri) = self.rooted_match(&root, import) {
                return Some(uri);
            }
        }

        // 6. Suffix at any directory boundary.
        for (uri, path) in self.known_paths() {
            if path.contains(&suffix) {
                return Some(uri);
            }
        }
        None
    }

    fn rooted_match(&self, root: &str, import: &str) -> Option<String> {
        let candidate = join_path(root.trim_end_matches('/'), import);
        let suffix = if candidate.starts_with('/') {
            candidate.clone()
        } else {
            format!("/{candidate}")
        };
        for (uri, path) in self.known_paths() {
            if path == candidate || path.ends_with(&suffix) {
                return Some(uri);
            }
        }
        None
    }

    fn known_paths(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.files_map()
            .keys()
            .map(|uri| (uri.clone(), uri_path(uri).to_string()))
    }

    /// Rewrites an import written with a virtual prefix to the actual
    /// prefix it resolves under.
    fn apply_path_mappings(&self, import: &str) -> String {
        for mapping in self.path_mappings_list() {
            let prefix = format!("{}/", mapping.virtual_prefix.trim_end_matches('/'));
            if let Some(rest) = import.strip_prefix(&prefix) {
                return join_path(mapping.actual_prefix.trim_end_matches('/'), rest);
            }
        }
        import.to_string()
    }

    /// Rewrites a computed import path under an actual prefix back to its
    /// virtual spelling.
    fn apply_inverse_mappings(&self, path: String) -> String {
        for mapping in self.path_mappings_list() {
            let prefix = format!("{}/", mapping.actual_prefix.trim_end_matches('/'));
            if let Some(rest) = path.strip_prefix(&prefix) {
                return join_path(mapping.virtual_prefix.trim_end_matches('/'), rest);
            }
        }
        path
    }

    /// Computes the path a user should write to import `target_uri` from
    /// `current_uri`.
    ///
    /// Candidates come from the configured import paths, the forward
    /// relative path, basenames of files sitting directly at a configured
    /// root, workspace roots, and a `..` traversal as a last resort; the
    /// google corpus is pinned to its canonical spelling. Candidates are
    /// ranked by source and then by length, and only candidates that
    /// resolve back to `target_uri` survive.
    pub fn import_path_for_file(&self, current_uri: &str, target_uri: &str) -> Option<String> {
        let current = normalize_uri(current_uri);
        let target = normalize_uri(target_uri);
        if !self.files_map().contains_key(&target) {
            return None;
        }
        let target_path = uri_path(&target).to_string();
        if let Some(pin) = google_pin(&target_path) {
            return Some(pin);
        }

        let current_dir = dirname(uri_path(&current)).to_string();
        let mut candidates: Vec<(u8, String)> = Vec::new();
        for root in self.import_paths_list() {
            if let Some(rel) = forward_relative(root, &target_path) {
                candidates.push((0, rel));
            }
        }
        if let Some(rel) = forward_relative(&current_dir, &target_path) {
            candidates.push((1, rel));
        }
        for root in self.import_paths_list() {
            if dirname(&target_path) == root.trim_end_matches('/') {
                candidates.push((2, basename(&target_path).to_string()));
            }
        }
        for root in self.workspace_roots_list() {
            if let Some(rel) = forward_relative(root, &target_path) {
                candidates.push((3, rel));
            }
        }
        let traversal = traversal_relative(&current_dir, &target_path);
        if !traversal.is_empty() {
            candidates.push((4, traversal));
        }

        candidates
            .into_iter()
            .map(|(rank, path)| (rank, self.apply_inverse_mappings(path)))
            .filter(|(_, path)| {
                self.run_import_strategies(&current, path).as_deref() == Some(target.as_str())
            })
            .sorted_by(|(rank_a, path_a), (rank_b, path_b)| {
                rank_a
                    .cmp(rank_b)
                    .then(path_a.len().cmp(&path_b.len()))
                    .then(path_a.cmp(path_b))
            })
            .map(|(_, path)| path)
            .next()
    }
}

fn google_pin(target_path: &str) -> Option<String> {
    for namespace in GOOGLE_NAMESPACES {
        if target_path.starts_with(namespace) {
            return Some(target_path.to_string());
        }
        if let Some(idx) = target_path.find(&format!("/{namespace}")) {
            return Some(target_path[idx + 1..].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::workspace::{PathMapping, Workspace};

    fn add(workspace: &mut Workspace, uri: &str, text: &str) {
        let file = protonav_parse::parse(uri, text);
        workspace.update_file(uri, file).unwrap();
    }

    #[test]
    fn direct_suffix_match() {
        let mut ws = Workspace::new();
        add(&mut ws, "file:///w/api/common.proto", "syntax = \"proto3\";");
        add(
            &mut ws,
            "file:///w/api/event.proto",
            "syntax = \"proto3\";\nimport \"api/common.proto\";",
        );
        assert_eq!(
            ws.resolve_import_to_uri("file:///w/api/event.proto", "api/common.proto"),
            Some("file:///w/api/common.proto".to_string()),
        );
    }

    #[test]
    fn bare_filename_matches_a_neighbour() {
        let mut ws = Workspace::new();
        add(&mut ws, "file:///w/a/common.proto", "syntax = \"proto3\";");
        add(&mut ws, "file:///w/a/user.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.resolve_import_to_uri("file:///w/a/user.proto", "common.proto"),
            Some("file:///w/a/common.proto".to_string()),
        );
    }

    #[test]
    fn relative_with_traversal() {
        let mut ws = Workspace::new();
        add(&mut ws, "file:///w/shared/base.proto", "syntax = \"proto3\";");
        add(&mut ws, "file:///w/svc/api.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.resolve_import_to_uri("file:///w/svc/api.proto", "../shared/base.proto"),
            Some("file:///w/shared/base.proto".to_string()),
        );
    }

    #[test]
    fn configured_import_path_roots() {
        let mut ws = Workspace::new();
        ws.set_import_paths(vec!["/w/vendor".to_string()]);
        add(
            &mut ws,
            "file:///w/vendor/nested/import.proto",
            "syntax = \"proto3\";",
        );
        add(&mut ws, "file:///w/test.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.resolve_import_to_uri("file:///w/test.proto", "nested/import.proto"),
            Some("file:///w/vendor/nested/import.proto".to_string()),
        );
    }

    #[test]
    fn builtin_stubs_resolve_with_empty_workspace() {
        let ws = Workspace::new();
        assert_eq!(
            ws.resolve_import_to_uri("file:///anywhere.proto", "google/protobuf/timestamp.proto"),
            Some("builtin:///google/protobuf/timestamp.proto".to_string()),
        );
    }

    #[test]
    fn late_binding_flips_unresolved_imports() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/event.proto",
            "syntax = \"proto3\";\nimport \"common.proto\";",
        );
        assert_eq!(
            ws.imports_with_resolutions("file:///w/event.proto")[0].resolved,
            None,
        );
        add(&mut ws, "file:///w/common.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.imports_with_resolutions("file:///w/event.proto")[0].resolved,
            Some("file:///w/common.proto".to_string()),
        );
    }

    #[test]
    fn remove_file_evicts_resolutions() {
        let mut ws = Workspace::new();
        add(&mut ws, "file:///w/common.proto", "syntax = \"proto3\";");
        add(
            &mut ws,
            "file:///w/event.proto",
            "syntax = \"proto3\";\nimport \"common.proto\";",
        );
        assert!(ws.imports_with_resolutions("file:///w/event.proto")[0]
            .resolved
            .is_some());
        ws.remove_file("file:///w/common.proto");
        assert_eq!(
            ws.imports_with_resolutions("file:///w/event.proto")[0].resolved,
            None,
        );
    }

    #[test]
    fn virtual_path_mappings_apply_both_ways() {
        let mut ws = Workspace::new();
        ws.set_import_path_mappings(vec![PathMapping {
            virtual_prefix: "acme".to_string(),
            actual_prefix: "/w/proto/acme".to_string(),
        }]);
        add(
            &mut ws,
            "file:///w/proto/acme/user.proto",
            "syntax = \"proto3\";",
        );
        add(&mut ws, "file:///w/main.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.resolve_import_to_uri("file:///w/main.proto", "acme/user.proto"),
            Some("file:///w/proto/acme/user.proto".to_string()),
        );
        assert_eq!(
            ws.import_path_for_file("file:///w/main.proto", "file:///w/proto/acme/user.proto"),
            Some("acme/user.proto".to_string()),
        );
    }

    #[test]
    fn suggested_path_prefers_configured_root_over_workspace_root() {
        let mut ws = Workspace::new();
        ws.set_import_paths(vec!["/w/vendor".to_string()]);
        ws.set_workspace_roots(vec!["/w".to_string()]);
        add(
            &mut ws,
            "file:///w/vendor/nested/import.proto",
            "syntax = \"proto3\";",
        );
        add(&mut ws, "file:///w/test.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.import_path_for_file("file:///w/test.proto", "file:///w/vendor/nested/import.proto"),
            Some("nested/import.proto".to_string()),
        );
    }

    #[test]
    fn google_corpus_is_pinned_to_canonical_paths() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/third_party/google/protobuf/timestamp.proto",
            "syntax = \"proto3\";\npackage google.protobuf;\nmessage Timestamp {}",
        );
        add(&mut ws, "file:///w/main.proto", "syntax = \"proto3\";");
        assert_eq!(
            ws.import_path_for_file(
                "file:///w/main.proto",
                "file:///w/third_party/google/protobuf/timestamp.proto",
            ),
            Some("google/protobuf/timestamp.proto".to_string()),
        );
    }

    #[test]
    fn round_trip_resolves_back() {
        let mut ws = Workspace::new();
        ws.set_workspace_roots(vec!["/w".to_string()]);
        add(&mut ws, "file:///w/a/deep/x.proto", "syntax = \"proto3\";");
        add(&mut ws, "file:///w/b/y.proto", "syntax = \"proto3\";");
        let path = ws
            .import_path_for_file("file:///w/b/y.proto", "file:///w/a/deep/x.proto")
            .unwrap();
        assert_eq!(
            ws.resolve_import_to_uri("file:///w/b/y.proto", &path),
            Some("file:///w/a/deep/x.proto".to_string()),
        );
    }

    #[test]
    fn config_change_clears_the_cache() {
        let mut ws = Workspace::new();
        add(&mut ws, "file:///w/vendor/dep.proto", "syntax = \"proto3\";");
        add(
            &mut ws,
            "file:///w/main.proto",
            "syntax = \"proto3\";\nimport \"dep.proto\";",
        );
        assert!(ws.imports_with_resolutions("file:///w/main.proto")[0]
            .resolved
            .is_some());
        // Reconfiguring re-runs resolution from scratch; the import still
        // binds, but through the fresh configuration.
        ws.set_import_paths(vec!["/w/vendor".to_string()]);
        assert_eq!(
            ws.imports_with_resolutions("file:///w/main.proto")[0].resolved,
            Some("file:///w/vendor/dep.proto".to_string()),
        );
    }
}
