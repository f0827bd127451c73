//! Type resolution.
//!
//! Resolves a possibly-relative type reference from a `(file, package)`
//! context against the symbol table, following protobuf's scoped-name
//! rules: innermost package scope first, then the current file's own
//! declarations (forward references included), then transitively imported
//! files. There is deliberately no workspace-wide fallback by simple name —
//! an unimported type must stay unresolved so the validator can tell the
//! user to add the import.

use std::collections::BTreeSet;

use protonav_parse::ast::{
    is_scalar_type, ExtendBlock, MessageDefinition, ProtoFile, Range,
};

use crate::symbol::{Location, SymbolInfo};
use crate::uri::normalize_uri;
use crate::workspace::Workspace;

/// One textual type reference in a file.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TypeRef<'a> {
    pub name: &'a str,
    pub range: Range,
}

impl Workspace {
    /// Resolves `type_name` as referenced from `uri`.
    ///
    /// Returns `None` for built-in scalars (the caller treats those as
    /// primitive) and for names that cannot be resolved through the scope
    /// chain or the file's transitive imports.
    pub fn resolve_type(
        &self,
        type_name: &str,
        uri: &str,
        package: Option<&str>,
    ) -> Option<&SymbolInfo> {
        if type_name.is_empty() || is_scalar_type(type_name) {
            return None;
        }
        let uri = normalize_uri(uri);

        // A leading dot is absolute: one lookup, no fallback.
        if let Some(absolute) = type_name.strip_prefix('.') {
            return self.type_symbol(absolute);
        }

        // Already-qualified names get a direct try first.
        if type_name.contains('.') {
            if let Some(symbol) = self.type_symbol(type_name) {
                return Some(symbol);
            }
        }

        // Walk the package scope chain from most specific to the root.
        let package = package
            .map(str::to_string)
            .or_else(|| self.file(&uri).map(|f| f.package_name().to_string()))
            .unwrap_or_default();
        let mut scope = package.as_str();
        loop {
            let candidate = if scope.is_empty() {
                type_name.to_string()
            } else {
                format!("{scope}.{type_name}")
            };
            if let Some(symbol) = self.type_symbol(&candidate) {
                return Some(symbol);
            }
            match scope.rfind('.') {
                Some(idx) => scope = &scope[..idx],
                None if !scope.is_empty() => scope = "",
                None => break,
            }
        }

        // The file's own declarations, top-level and nested. Local types
        // win over imports and forward references are legal.
        if let Some(symbol) = self.type_in_file(&uri, type_name) {
            return Some(symbol);
        }

        // Transitively imported files: first each file's package prefix,
        // then a simple-name or dotted-suffix scan of its symbols.
        let imported = self.imported_file_uris(&uri);
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for imported_uri in &imported {
            if !seen.insert(imported_uri) {
                continue;
            }
            let Some(file) = self.file(imported_uri) else {
                continue;
            };
            let prefixed = match file.package_name() {
                "" => type_name.to_string(),
                pkg => format!("{pkg}.{type_name}"),
            };
            if let Some(symbol) = self.type_symbol(&prefixed) {
                return Some(symbol);
            }
        }
        for imported_uri in &imported {
            if let Some(symbol) = self.type_in_file(imported_uri, type_name) {
                return Some(symbol);
            }
        }
        None
    }

    /// Every reference to the symbol named by `full_name` (or, failing
    /// that, by the bare `name`), starting with the declaration itself.
    ///
    /// Each use site is re-resolved in its own file's scope and kept only
    /// when it lands on the same fully-qualified name, so a same-named type
    /// in another package never pollutes the result.
    pub fn find_references(&self, name: &str, full_name: Option<&str>) -> Vec<Location> {
        let target = match full_name {
            Some(full) => full.to_string(),
            None => match self.symbol(name) {
                Some(symbol) => symbol.full_name.clone(),
                None => return Vec::new(),
            },
        };
        let target_tail = last_segment(&target);

        let mut locations = Vec::new();
        if let Some(symbol) = self.symbol(&target) {
            locations.push(symbol.location.clone());
        }
        for file in self.files() {
            let package = file.package_name().to_string();
            for_each_type_reference(file, &mut |reference: TypeRef<'_>| {
                if last_segment(reference.name) != target_tail {
                    return;
                }
                let resolved = self.resolve_type(reference.name, &file.uri, Some(&package));
                if resolved.map(|s| s.full_name.as_str()) == Some(target.as_str()) {
                    locations.push(Location {
                        uri: file.uri.clone(),
                        range: reference.range,
                    });
                }
            });
        }
        locations
    }

    fn type_symbol(&self, full_name: &str) -> Option<&SymbolInfo> {
        self.symbol(full_name).filter(|s| s.kind.is_type())
    }

    /// Finds a type declared in `uri` whose full name is `name` or ends in
    /// `.name` (so nested references like `Outer.Inner` match).
    fn type_in_file(&self, uri: &str, name: &str) -> Option<&SymbolInfo> {
        let dotted = format!(".{name}");
        self.symbols_in_file(uri)
            .into_iter()
            .filter(|s| s.kind.is_type())
            .filter(|s| s.full_name == name || s.full_name.ends_with(&dotted))
            .min_by_key(|s| s.full_name.len())
    }
}

fn last_segment(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Calls `visit` for every textual type reference in `file`: field types,
/// map key and value types, RPC signatures and extend targets. Scalars are
/// not filtered here; callers decide.
pub(crate) fn for_each_type_reference<'a>(
    file: &'a ProtoFile,
    visit: &mut dyn FnMut(TypeRef<'a>),
) {
    for message in &file.messages {
        visit_message(message, visit);
    }
    for service in &file.services {
        for rpc in &service.rpcs {
            visit(TypeRef {
                name: &rpc.input_type,
                range: rpc.input_type_range,
            });
            visit(TypeRef {
                name: &rpc.output_type,
                range: rpc.output_type_range,
            });
        }
    }
    for extend in &file.extends {
        visit_extend(extend, visit);
    }
}

fn visit_message<'a>(message: &'a MessageDefinition, visit: &mut dyn FnMut(TypeRef<'a>)) {
    for field in &message.fields {
        visit(TypeRef {
            name: &field.field_type,
            range: field.type_range,
        });
    }
    for map in &message.maps {
        visit(TypeRef {
            name: &map.value_type,
            range: map.value_type_range,
        });
    }
    for oneof in &message.oneofs {
        for field in &oneof.fields {
            visit(TypeRef {
                name: &field.field_type,
                range: field.type_range,
            });
        }
    }
    for group in &message.groups {
        visit_message(&group.body, visit);
    }
    for nested in &message.nested_messages {
        visit_message(nested, visit);
    }
    for extend in &message.extends {
        visit_extend(extend, visit);
    }
}

fn visit_extend<'a>(extend: &'a ExtendBlock, visit: &mut dyn FnMut(TypeRef<'a>)) {
    visit(TypeRef {
        name: &extend.target,
        range: extend.target_range,
    });
    for field in &extend.fields {
        visit(TypeRef {
            name: &field.field_type,
            range: field.type_range,
        });
    }
    for group in &extend.groups {
        visit_message(&group.body, visit);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::symbol::SymbolKind;
    use crate::workspace::Workspace;

    fn add(workspace: &mut Workspace, uri: &str, text: &str) {
        let file = protonav_parse::parse(uri, text);
        workspace.update_file(uri, file).unwrap();
    }

    #[test]
    fn scalars_resolve_to_none() {
        let ws = Workspace::new();
        assert!(ws.resolve_type("int32", "file:///a.proto", None).is_none());
        assert!(ws.resolve_type("string", "file:///a.proto", None).is_none());
    }

    #[test]
    fn qualified_reference_across_files() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/common.proto",
            "syntax = \"proto3\";\npackage common.v1;\nmessage Timestamp { int64 seconds = 1; }",
        );
        add(
            &mut ws,
            "file:///w/event.proto",
            "syntax = \"proto3\";\npackage main.v1;\nimport \"common.proto\";\nmessage Event { common.v1.Timestamp t = 1; }",
        );
        let symbol = ws
            .resolve_type("common.v1.Timestamp", "file:///w/event.proto", Some("main.v1"))
            .unwrap();
        assert_eq!(symbol.full_name, "common.v1.Timestamp");
        assert_eq!(symbol.location.uri, "file:///w/common.proto");
        assert_eq!(symbol.kind, SymbolKind::Message);
    }

    #[test]
    fn same_package_wins_over_other_packages() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\npackage a.v1;\nmessage User {}",
        );
        add(
            &mut ws,
            "file:///w/b.proto",
            "syntax = \"proto3\";\npackage b.v1;\nmessage User {}",
        );
        let from_a = ws.resolve_type("User", "file:///w/a.proto", Some("a.v1")).unwrap();
        assert_eq!(from_a.full_name, "a.v1.User");
        let from_b = ws.resolve_type("User", "file:///w/b.proto", Some("b.v1")).unwrap();
        assert_eq!(from_b.full_name, "b.v1.User");
    }

    #[test]
    fn self_reference_and_forward_reference_resolve() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/tree.proto",
            "syntax = \"proto3\";\nmessage TreeNode { repeated TreeNode children = 2; TreeNode parent = 3; Leaf leaf = 4; }\nmessage Leaf { string id = 1; }",
        );
        let node = ws.resolve_type("TreeNode", "file:///w/tree.proto", None).unwrap();
        assert_eq!(node.full_name, "TreeNode");
        // Forward reference: Leaf is declared after its use.
        let leaf = ws.resolve_type("Leaf", "file:///w/tree.proto", None).unwrap();
        assert_eq!(leaf.full_name, "Leaf");
    }

    #[test]
    fn unimported_simple_name_does_not_resolve() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/other.proto",
            "syntax = \"proto3\";\npackage other.v1;\nmessage Hidden {}",
        );
        add(
            &mut ws,
            "file:///w/main.proto",
            "syntax = \"proto3\";\npackage main.v1;\nmessage M { Hidden h = 1; }",
        );
        assert!(ws
            .resolve_type("Hidden", "file:///w/main.proto", Some("main.v1"))
            .is_none());
    }

    #[test]
    fn imported_simple_name_resolves_through_package_prefix() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/types.proto",
            "syntax = \"proto3\";\npackage shared;\nmessage Money { int64 units = 1; }",
        );
        add(
            &mut ws,
            "file:///w/order.proto",
            "syntax = \"proto3\";\npackage shop;\nimport \"types.proto\";\nmessage Order { Money total = 1; }",
        );
        let money = ws
            .resolve_type("Money", "file:///w/order.proto", Some("shop"))
            .unwrap();
        assert_eq!(money.full_name, "shared.Money");
    }

    #[test]
    fn transitive_imports_are_searched() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/base.proto",
            "syntax = \"proto3\";\npackage base;\nmessage Id {}",
        );
        add(
            &mut ws,
            "file:///w/mid.proto",
            "syntax = \"proto3\";\npackage mid;\nimport \"base.proto\";",
        );
        add(
            &mut ws,
            "file:///w/top.proto",
            "syntax = \"proto3\";\npackage top;\nimport \"mid.proto\";\nmessage T { base.Id id = 1; }",
        );
        let id = ws.resolve_type("Id", "file:///w/top.proto", Some("top")).unwrap();
        assert_eq!(id.full_name, "base.Id");
    }

    #[test]
    fn import_cycles_terminate() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\npackage pa;\nimport \"b.proto\";\nmessage A {}",
        );
        add(
            &mut ws,
            "file:///w/b.proto",
            "syntax = \"proto3\";\npackage pb;\nimport \"a.proto\";\nmessage B {}",
        );
        let b = ws.resolve_type("B", "file:///w/a.proto", Some("pa")).unwrap();
        assert_eq!(b.full_name, "pb.B");
        let a = ws.resolve_type("A", "file:///w/b.proto", Some("pb")).unwrap();
        assert_eq!(a.full_name, "pa.A");
    }

    #[test]
    fn nested_dotted_suffix_resolves() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/n.proto",
            "syntax = \"proto3\";\npackage p;\nmessage Outer { message Inner {} }\nmessage Use { Outer.Inner i = 1; }",
        );
        let inner = ws
            .resolve_type("Outer.Inner", "file:///w/n.proto", Some("p"))
            .unwrap();
        assert_eq!(inner.full_name, "p.Outer.Inner");
    }

    #[test]
    fn references_distinguish_packages() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\npackage a.v1;\nmessage User {}\nmessage Pa { User u = 1; }",
        );
        add(
            &mut ws,
            "file:///w/b.proto",
            "syntax = \"proto3\";\npackage b.v1;\nmessage User {}\nmessage Pb { User u = 1; }",
        );
        let refs = ws.find_references("User", Some("a.v1.User"));
        // Declaration plus the one use in a.proto; nothing from b.proto.
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|loc| loc.uri == "file:///w/a.proto"));
    }

    #[test]
    fn references_cover_rpc_signatures() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/svc.proto",
            "syntax = \"proto3\";\npackage s;\nmessage Req {}\nmessage Resp {}\nservice S { rpc Call (Req) returns (Resp); }",
        );
        let refs = ws.find_references("Req", Some("s.Req"));
        assert_eq!(refs.len(), 2);
    }
}
