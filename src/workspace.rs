//! The workspace index.
//!
//! [`Workspace`] is the singleton owner of every parsed tree and the flat
//! symbol table over them. All mutation happens through a handful of
//! methods that each run to completion before the next query; queries never
//! observe a half-updated index.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use multimap::MultiMap;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use protonav_parse::ast::{
    EnumDefinition, ImportModifier, MessageDefinition, ProtoFile, ServiceDefinition,
};

use crate::error::Error;
use crate::symbol::{Location, SymbolInfo, SymbolKind};
use crate::uri::{dirname, normalize_uri, uri_path};

/// A `{virtual, actual}` import path mapping: imports written under the
/// virtual prefix resolve against files under the actual prefix, and
/// suggested import paths for such files are written with the virtual
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub virtual_prefix: String,
    pub actual_prefix: String,
}

/// How an import edge re-exports its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImportKind {
    Plain,
    Public,
    Weak,
}

impl From<ImportModifier> for ImportKind {
    fn from(modifier: ImportModifier) -> ImportKind {
        match modifier {
            ImportModifier::None => ImportKind::Plain,
            ImportModifier::Public => ImportKind::Public,
            ImportModifier::Weak => ImportKind::Weak,
        }
    }
}

/// Key of the import resolution cache.
///
/// Imports with a directory component mean the same file from anywhere, so
/// they are cached by path alone. A bare filename like `common.proto` can
/// legitimately mean a different neighbour for each importing file, so it
/// is cached per source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ResolutionKey {
    Path(String),
    PerFile(String, String),
}

impl ResolutionKey {
    pub(crate) fn new(source_uri: &str, import: &str) -> ResolutionKey {
        if import.contains('/') {
            ResolutionKey::Path(import.to_string())
        } else {
            ResolutionKey::PerFile(source_uri.to_string(), import.to_string())
        }
    }

    fn is_for_source(&self, uri: &str) -> bool {
        matches!(self, ResolutionKey::PerFile(source, _) if source == uri)
    }
}

/// One import of a file together with its current resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportResolution {
    pub path: String,
    pub modifier: ImportModifier,
    pub path_range: protonav_parse::ast::Range,
    pub resolved: Option<String>,
}

/// External configuration source (for example a buf config discovered next
/// to the workspace). The engine tolerates its absence and treats every
/// method as best-effort.
pub trait ConfigOracle {
    /// Extra proto roots declared by configuration under `dir`.
    fn proto_roots(&self, _dir: &str) -> Vec<String> {
        Vec::new()
    }

    /// Registry modules declared as dependencies under `dir`.
    fn registry_dependencies(&self, _dir: &str) -> Vec<String> {
        Vec::new()
    }
}

/// The semantic index over every open `.proto` file.
pub struct Workspace {
    files: BTreeMap<String, ProtoFile>,
    symbols: BTreeMap<String, SymbolInfo>,
    /// Simple name → full name, first writer wins. A hint for quick jumps,
    /// never consulted by type resolution.
    aliases: HashMap<String, String>,
    file_symbols: MultiMap<String, String>,
    /// Literal import paths per file, as written in source.
    file_imports: BTreeMap<String, Vec<String>>,
    resolutions: HashMap<ResolutionKey, String>,
    import_paths: Vec<String>,
    workspace_roots: Vec<String>,
    path_mappings: Vec<PathMapping>,
    extra_roots: BTreeSet<String>,
    graph: Graph<String, ImportKind>,
    graph_nodes: HashMap<String, NodeIndex>,
    oracle: Option<Box<dyn ConfigOracle>>,
}

impl Default for Workspace {
    fn default() -> Workspace {
        Workspace::new()
    }
}

impl Workspace {
    /// An empty workspace with the bundled well-known stubs pre-registered
    /// under `builtin:///…` URIs.
    pub fn new() -> Workspace {
        let mut workspace = Workspace {
            files: BTreeMap::new(),
            symbols: BTreeMap::new(),
            aliases: HashMap::new(),
            file_symbols: MultiMap::new(),
            file_imports: BTreeMap::new(),
            resolutions: HashMap::new(),
            import_paths: Vec::new(),
            workspace_roots: Vec::new(),
            path_mappings: Vec::new(),
            extra_roots: BTreeSet::new(),
            graph: Graph::new(),
            graph_nodes: HashMap::new(),
            oracle: None,
        };
        for (path, source) in protonav_wkt::STUBS {
            let uri = protonav_wkt::builtin_uri(path);
            let file = protonav_parse::parse(&uri, source);
            workspace.insert_file(&uri, file);
        }
        workspace.finish_mutation();
        workspace
    }

    // ---- mutations ----------------------------------------------------

    /// Inserts or replaces the tree for `uri`.
    ///
    /// Idempotent: updating with an identical tree leaves every index in
    /// the same state. Previously unresolved imports anywhere in the
    /// workspace are re-scanned in case this file satisfies them.
    pub fn update_file(&mut self, uri: &str, file: ProtoFile) -> Result<(), Error> {
        if uri.is_empty() {
            return Err(Error::invalid_argument("uri must not be empty"));
        }
        self.insert_file(uri, file);
        self.finish_mutation();
        Ok(())
    }

    /// Drops `uri` and everything derived from it: its symbols, its import
    /// records, and any cached resolution pointing at it.
    pub fn remove_file(&mut self, uri: &str) {
        let uri = normalize_uri(uri);
        self.evict_file_symbols(&uri);
        self.files.remove(&uri);
        self.file_imports.remove(&uri);
        self.resolutions
            .retain(|key, target| target != &uri && !key.is_for_source(&uri));
        self.finish_mutation();
    }

    /// Replaces the configured external search roots. Clears the resolution
    /// cache: any cached answer may be stale under the new configuration.
    pub fn set_import_paths(&mut self, paths: Vec<String>) {
        self.import_paths = paths.into_iter().map(|p| normalize_uri(&p)).collect();
        self.resolutions.clear();
        self.finish_mutation();
    }

    /// Replaces the workspace roots. Clears the resolution cache.
    pub fn set_workspace_roots(&mut self, roots: Vec<String>) {
        self.workspace_roots = roots.into_iter().map(|r| normalize_uri(&r)).collect();
        self.resolutions.clear();
        self.finish_mutation();
    }

    /// Replaces the virtual path mappings. Clears the resolution cache.
    pub fn set_import_path_mappings(&mut self, mappings: Vec<PathMapping>) {
        self.path_mappings = mappings;
        self.resolutions.clear();
        self.finish_mutation();
    }

    /// Adds a single proto root (for example one discovered by external
    /// configuration).
    pub fn add_proto_root(&mut self, dir: &str) {
        self.extra_roots.insert(normalize_uri(dir));
        self.finish_mutation();
    }

    /// Installs the external configuration oracle.
    pub fn set_config_oracle(&mut self, oracle: Box<dyn ConfigOracle>) {
        self.oracle = Some(oracle);
        self.resolutions.clear();
        self.finish_mutation();
    }

    fn insert_file(&mut self, uri: &str, mut file: ProtoFile) {
        let uri = normalize_uri(uri);
        debug!("updating {uri}");
        self.evict_file_symbols(&uri);
        file.uri = uri.clone();
        let imports: Vec<String> = file.imports.iter().map(|i| i.path.clone()).collect();
        self.file_imports.insert(uri.clone(), imports);
        self.files.insert(uri.clone(), file);
        let symbols = collect_file_symbols(&self.files[&uri]);
        for symbol in symbols {
            self.aliases
                .entry(symbol.name.clone())
                .or_insert_with(|| symbol.full_name.clone());
            self.file_symbols.insert(uri.clone(), symbol.full_name.clone());
            self.symbols.insert(symbol.full_name.clone(), symbol);
        }
    }

    /// Re-resolves every still-unresolved import and rebuilds the import
    /// graph. Runs at the end of every mutation, so queries always see a
    /// bound, stale-free index.
    fn finish_mutation(&mut self) {
        self.bind_pending_imports();
        self.rebuild_import_graph();
    }

    fn evict_file_symbols(&mut self, uri: &str) {
        let Some(names) = self.file_symbols.remove(uri) else {
            return;
        };
        for name in names {
            let owned_here = self
                .symbols
                .get(&name)
                .map_or(false, |sym| sym.location.uri == uri);
            if owned_here {
                self.symbols.remove(&name);
                self.aliases.retain(|_, full| full != &name);
            }
        }
    }

    fn rebuild_import_graph(&mut self) {
        let mut graph = Graph::new();
        let mut nodes = HashMap::new();
        for uri in self.files.keys() {
            nodes.insert(uri.clone(), graph.add_node(uri.clone()));
        }
        for (uri, file) in &self.files {
            let Some(&from) = nodes.get(uri) else { continue };
            for import in &file.imports {
                let key = ResolutionKey::new(uri, &import.path);
                if let Some(target) = self.resolutions.get(&key) {
                    if let Some(&to) = nodes.get(target) {
                        graph.add_edge(from, to, ImportKind::from(import.modifier));
                    }
                }
            }
        }
        self.graph = graph;
        self.graph_nodes = nodes;
    }

    // ---- queries ------------------------------------------------------

    pub fn file(&self, uri: &str) -> Option<&ProtoFile> {
        self.files.get(&normalize_uri(uri))
    }

    /// Every known file, builtins included, in URI order.
    pub fn files(&self) -> impl Iterator<Item = &ProtoFile> {
        self.files.values()
    }

    pub fn contains_file(&self, uri: &str) -> bool {
        self.files.contains_key(&normalize_uri(uri))
    }

    /// Looks up a symbol by fully-qualified name. A bare simple name falls
    /// back to the first-writer alias, as a convenience for quick jumps.
    pub fn symbol(&self, full_name: &str) -> Option<&SymbolInfo> {
        if let Some(symbol) = self.symbols.get(full_name) {
            return Some(symbol);
        }
        if !full_name.contains('.') {
            let full = self.aliases.get(full_name)?;
            return self.symbols.get(full);
        }
        None
    }

    /// Every symbol in the workspace, ordered by full name.
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }

    /// The symbols declared by one file.
    pub fn symbols_in_file(&self, uri: &str) -> Vec<&SymbolInfo> {
        let uri = normalize_uri(uri);
        let Some(names) = self.file_symbols.get_vec(&uri) else {
            return Vec::new();
        };
        names
            .iter()
            .filter_map(|name| self.symbols.get(name))
            .filter(|sym| sym.location.uri == uri)
            .collect()
    }

    /// The symbols visible from `uri`: its own declarations plus everything
    /// reachable through its transitive imports.
    pub fn accessible_symbols(&self, uri: &str) -> Vec<&SymbolInfo> {
        let uri = normalize_uri(uri);
        let mut result = self.symbols_in_file(&uri);
        for imported in self.imported_file_uris(&uri) {
            result.extend(self.symbols_in_file(&imported));
        }
        result
    }

    /// The leading doc comment of a symbol, if any.
    pub fn documentation_for(&self, full_name: &str) -> Option<&str> {
        self.symbol(full_name)?.documentation.as_deref()
    }

    /// The message definition node behind a fully-qualified name.
    pub fn message(&self, full_name: &str) -> Option<&MessageDefinition> {
        let symbol = self.symbols.get(full_name)?;
        if symbol.kind != SymbolKind::Message {
            return None;
        }
        let file = self.files.get(&symbol.location.uri)?;
        find_message(file, full_name)
    }

    /// The enum definition node behind a fully-qualified name.
    pub fn enum_def(&self, full_name: &str) -> Option<&EnumDefinition> {
        let symbol = self.symbols.get(full_name)?;
        if symbol.kind != SymbolKind::Enum {
            return None;
        }
        let file = self.files.get(&symbol.location.uri)?;
        find_enum(file, full_name)
    }

    /// The imports of `uri`, each with its current resolution.
    pub fn imports_with_resolutions(&self, uri: &str) -> Vec<ImportResolution> {
        let uri = normalize_uri(uri);
        let Some(file) = self.files.get(&uri) else {
            return Vec::new();
        };
        file.imports
            .iter()
            .map(|import| ImportResolution {
                path: import.path.clone(),
                modifier: import.modifier,
                path_range: import.path_range,
                resolved: self
                    .resolutions
                    .get(&ResolutionKey::new(&uri, &import.path))
                    .cloned(),
            })
            .collect()
    }

    /// Every file transitively imported by `uri` (imports of imports
    /// included), cycle-safe.
    pub fn imported_file_uris(&self, uri: &str) -> Vec<String> {
        let uri = normalize_uri(uri);
        let Some(&start) = self.graph_nodes.get(&uri) else {
            return Vec::new();
        };
        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut stack = vec![start];
        let mut result = Vec::new();
        while let Some(node) = stack.pop() {
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                if target != start && visited.insert(target) {
                    result.push(self.graph[target].clone());
                    stack.push(target);
                }
            }
        }
        result
    }

    /// The files whose declarations `uri` may reference without a new
    /// import statement: itself, its direct imports, and the public-import
    /// closure of those.
    pub fn import_reachable_uris(&self, uri: &str) -> BTreeSet<String> {
        let uri = normalize_uri(uri);
        let mut reachable = BTreeSet::new();
        reachable.insert(uri.clone());
        let Some(&start) = self.graph_nodes.get(&uri) else {
            return reachable;
        };
        let mut stack: Vec<(NodeIndex, bool)> = vec![(start, true)];
        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        visited.insert(start);
        while let Some((node, direct)) = stack.pop() {
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                // Past the first hop, only `import public` re-exports.
                if !direct && *edge.weight() != ImportKind::Public {
                    continue;
                }
                let target = edge.target();
                if visited.insert(target) {
                    reachable.insert(self.graph[target].clone());
                    stack.push((target, false));
                }
            }
        }
        reachable
    }

    /// `uri` plus everything it re-exports through `import public` chains.
    pub(crate) fn public_export_closure(&self, uri: &str) -> BTreeSet<String> {
        let uri = normalize_uri(uri);
        let mut closure = BTreeSet::new();
        closure.insert(uri.clone());
        let Some(&start) = self.graph_nodes.get(&uri) else {
            return closure;
        };
        let mut stack = vec![start];
        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        visited.insert(start);
        while let Some(node) = stack.pop() {
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                if *edge.weight() != ImportKind::Public {
                    continue;
                }
                let target = edge.target();
                if visited.insert(target) {
                    closure.insert(self.graph[target].clone());
                    stack.push(target);
                }
            }
        }
        closure
    }

    // ---- internal accessors shared with the resolver modules ----------

    pub(crate) fn resolution_cache(&self) -> &HashMap<ResolutionKey, String> {
        &self.resolutions
    }

    pub(crate) fn resolution_cache_mut(&mut self) -> &mut HashMap<ResolutionKey, String> {
        &mut self.resolutions
    }

    pub(crate) fn files_map(&self) -> &BTreeMap<String, ProtoFile> {
        &self.files
    }

    pub(crate) fn import_paths_list(&self) -> &[String] {
        &self.import_paths
    }

    pub(crate) fn workspace_roots_list(&self) -> &[String] {
        &self.workspace_roots
    }

    pub(crate) fn path_mappings_list(&self) -> &[PathMapping] {
        &self.path_mappings
    }

    /// Every directory that may serve as an import root: ancestors of known
    /// files, configured import paths, workspace roots, and externally
    /// declared roots.
    pub(crate) fn derived_proto_roots(&self) -> BTreeSet<String> {
        let mut roots = BTreeSet::new();
        for uri in self.files.keys() {
            let mut dir = dirname(uri_path(uri));
            while !dir.is_empty() && dir != "/" {
                roots.insert(dir.to_string());
                dir = dirname(dir);
            }
        }
        roots.extend(self.import_paths.iter().cloned());
        roots.extend(self.workspace_roots.iter().cloned());
        roots.extend(self.extra_roots.iter().cloned());
        if let Some(oracle) = &self.oracle {
            for root in &self.workspace_roots {
                roots.extend(oracle.proto_roots(root));
            }
        }
        roots
    }

    /// Registry modules declared by external configuration, if any.
    pub(crate) fn declared_registry_dependencies(&self) -> Vec<String> {
        let Some(oracle) = &self.oracle else {
            return Vec::new();
        };
        let mut deps = Vec::new();
        for root in &self.workspace_roots {
            deps.extend(oracle.registry_dependencies(root));
        }
        deps
    }
}

// ---- symbol extraction ------------------------------------------------

fn join_name(container: &str, name: &str) -> String {
    if container.is_empty() {
        name.to_string()
    } else {
        format!("{container}.{name}")
    }
}

fn collect_file_symbols(file: &ProtoFile) -> Vec<SymbolInfo> {
    let mut out = Vec::new();
    let package = file.package_name();
    for message in &file.messages {
        collect_message(file, package, message, &mut out);
    }
    for item in &file.enums {
        collect_enum(file, package, item, &mut out);
    }
    for service in &file.services {
        collect_service(file, package, service, &mut out);
    }
    for extend in &file.extends {
        for field in &extend.fields {
            out.push(symbol(
                file,
                &field.name,
                join_name(package, &field.name),
                SymbolKind::Field,
                field.name_range,
                Some(package.to_string()).filter(|p| !p.is_empty()),
                field.comments.leading.clone(),
            ));
        }
    }
    out
}

fn collect_message(
    file: &ProtoFile,
    container: &str,
    message: &MessageDefinition,
    out: &mut Vec<SymbolInfo>,
) {
    let full = join_name(container, &message.name);
    out.push(symbol(
        file,
        &message.name,
        full.clone(),
        SymbolKind::Message,
        message.name_range,
        Some(container.to_string()).filter(|c| !c.is_empty()),
        message.comments.leading.clone(),
    ));
    for field in &message.fields {
        out.push(symbol(
            file,
            &field.name,
            join_name(&full, &field.name),
            SymbolKind::Field,
            field.name_range,
            Some(full.clone()),
            field.comments.leading.clone(),
        ));
    }
    for map in &message.maps {
        out.push(symbol(
            file,
            &map.name,
            join_name(&full, &map.name),
            SymbolKind::Field,
            map.name_range,
            Some(full.clone()),
            map.comments.leading.clone(),
        ));
    }
    for oneof in &message.oneofs {
        out.push(symbol(
            file,
            &oneof.name,
            join_name(&full, &oneof.name),
            SymbolKind::Oneof,
            oneof.name_range,
            Some(full.clone()),
            oneof.comments.leading.clone(),
        ));
        // Oneof members are fields of the enclosing message.
        for field in &oneof.fields {
            out.push(symbol(
                file,
                &field.name,
                join_name(&full, &field.name),
                SymbolKind::Field,
                field.name_range,
                Some(full.clone()),
                field.comments.leading.clone(),
            ));
        }
    }
    for group in &message.groups {
        collect_message(file, &full, &group.body, out);
    }
    for nested in &message.nested_messages {
        collect_message(file, &full, nested, out);
    }
    for nested in &message.nested_enums {
        collect_enum(file, &full, nested, out);
    }
    for extend in &message.extends {
        for field in &extend.fields {
            out.push(symbol(
                file,
                &field.name,
                join_name(&full, &field.name),
                SymbolKind::Field,
                field.name_range,
                Some(full.clone()),
                field.comments.leading.clone(),
            ));
        }
    }
}

fn collect_enum(
    file: &ProtoFile,
    container: &str,
    item: &EnumDefinition,
    out: &mut Vec<SymbolInfo>,
) {
    let full = join_name(container, &item.name);
    out.push(symbol(
        file,
        &item.name,
        full.clone(),
        SymbolKind::Enum,
        item.name_range,
        Some(container.to_string()).filter(|c| !c.is_empty()),
        item.comments.leading.clone(),
    ));
    for value in &item.values {
        out.push(symbol(
            file,
            &value.name,
            join_name(&full, &value.name),
            SymbolKind::EnumValue,
            value.name_range,
            Some(full.clone()),
            value.comments.leading.clone(),
        ));
    }
}

fn collect_service(
    file: &ProtoFile,
    container: &str,
    service: &ServiceDefinition,
    out: &mut Vec<SymbolInfo>,
) {
    let full = join_name(container, &service.name);
    out.push(symbol(
        file,
        &service.name,
        full.clone(),
        SymbolKind::Service,
        service.name_range,
        Some(container.to_string()).filter(|c| !c.is_empty()),
        service.comments.leading.clone(),
    ));
    for rpc in &service.rpcs {
        out.push(symbol(
            file,
            &rpc.name,
            join_name(&full, &rpc.name),
            SymbolKind::Rpc,
            rpc.name_range,
            Some(full.clone()),
            rpc.comments.leading.clone(),
        ));
    }
}

fn symbol(
    file: &ProtoFile,
    name: &str,
    full_name: String,
    kind: SymbolKind,
    name_range: protonav_parse::ast::Range,
    container_name: Option<String>,
    documentation: Option<String>,
) -> SymbolInfo {
    SymbolInfo {
        name: name.to_string(),
        full_name,
        kind,
        location: Location {
            uri: file.uri.clone(),
            range: name_range,
        },
        container_name,
        documentation,
    }
}

// ---- AST lookup by full name -------------------------------------------

fn relative_segments<'a>(file: &ProtoFile, full_name: &'a str) -> Option<Vec<&'a str>> {
    let package = file.package_name();
    let rel = if package.is_empty() {
        full_name
    } else {
        full_name.strip_prefix(package)?.strip_prefix('.')?
    };
    Some(rel.split('.').collect())
}

fn find_message<'a>(file: &'a ProtoFile, full_name: &str) -> Option<&'a MessageDefinition> {
    let segments = relative_segments(file, full_name)?;
    let (first, rest) = segments.split_first()?;
    let mut current = file.messages.iter().find(|m| &m.name == first)?;
    for segment in rest {
        current = current
            .nested_messages
            .iter()
            .find(|m| &m.name == segment)
            .or_else(|| {
                current
                    .groups
                    .iter()
                    .map(|g| &g.body)
                    .find(|b| &b.name == segment)
            })?;
    }
    Some(current)
}

fn find_enum<'a>(file: &'a ProtoFile, full_name: &str) -> Option<&'a EnumDefinition> {
    let segments = relative_segments(file, full_name)?;
    match segments.split_last()? {
        (last, []) => file.enums.iter().find(|e| &e.name == last),
        (last, path) => {
            let message_name = join_name(file.package_name(), &path.join("."));
            let message = find_message(file, &message_name)?;
            message.nested_enums.iter().find(|e| &e.name == last)
        }
    }
}
