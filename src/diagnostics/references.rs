//! Type reference validation.
//!
//! Unknown types, resolvable-but-unimported types, and uses of deprecated
//! declarations. When the file has an unresolved import that looks like a
//! Buf registry module, unknown-type diagnostics are suppressed wholesale:
//! the missing registry file is the root cause and one diagnostic for it is
//! enough.

use std::collections::BTreeSet;

use protonav_parse::ast::{is_scalar_type, ProtoFile};

use super::{Diagnostic, DiagnosticKind, Severity};
use crate::registry;
use crate::symbol::SymbolKind;
use crate::typeres::for_each_type_reference;
use crate::uri::uri_path;
use crate::workspace::Workspace;

pub(super) fn check(workspace: &Workspace, file: &ProtoFile, out: &mut Vec<Diagnostic>) {
    let resolutions = workspace.imports_with_resolutions(&file.uri);
    let registry_import_missing = resolutions
        .iter()
        .any(|import| import.resolved.is_none() && registry::is_registry_import(&import.path));
    let reachable: BTreeSet<String> = workspace.import_reachable_uris(&file.uri);
    let package = file.package_name().to_string();

    for_each_type_reference(file, &mut |reference| {
        if reference.name.is_empty() || is_scalar_type(reference.name) {
            return;
        }
        let Some(symbol) = workspace.resolve_type(reference.name, &file.uri, Some(&package))
        else {
            if !registry_import_missing {
                out.push(Diagnostic::new(
                    reference.range,
                    Severity::Error,
                    DiagnosticKind::Reference,
                    format!("unknown type '{}'", reference.name),
                ));
            }
            return;
        };

        if !reachable.contains(&symbol.location.uri) {
            let suggested = workspace
                .import_path_for_file(&file.uri, &symbol.location.uri)
                .unwrap_or_else(|| uri_path(&symbol.location.uri).to_string());
            out.push(
                Diagnostic::new(
                    reference.range,
                    Severity::Error,
                    DiagnosticKind::Reference,
                    format!(
                        "'{}' is not imported, add import \"{suggested}\"",
                        reference.name,
                    ),
                )
                .with_data(suggested),
            );
        }

        let deprecated = match symbol.kind {
            SymbolKind::Message => workspace
                .message(&symbol.full_name)
                .map_or(false, |m| m.is_deprecated()),
            SymbolKind::Enum => workspace
                .enum_def(&symbol.full_name)
                .map_or(false, |e| e.is_deprecated()),
            _ => false,
        };
        if deprecated {
            out.push(Diagnostic::new(
                reference.range,
                Severity::Warning,
                DiagnosticKind::Deprecated,
                format!("'{}' is deprecated", symbol.full_name),
            ));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::super::{check_file, Diagnostic, DiagnosticKind, Severity};
    use crate::workspace::Workspace;

    fn add(ws: &mut Workspace, uri: &str, text: &str) {
        ws.update_file(uri, protonav_parse::parse(uri, text)).unwrap();
    }

    fn diagnostics_of_kind(ws: &Workspace, uri: &str, kind: DiagnosticKind) -> Vec<Diagnostic> {
        check_file(ws, uri)
            .into_iter()
            .filter(|d| d.kind == kind)
            .collect()
    }

    #[test]
    fn unknown_type_is_an_error() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\nmessage M { Missing x = 1; }",
        );
        let diags = diagnostics_of_kind(&ws, "file:///w/a.proto", DiagnosticKind::Reference);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "unknown type 'Missing'");
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn self_reference_is_clean() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/tree.proto",
            "syntax = \"proto3\";\nmessage TreeNode { repeated TreeNode children = 2; TreeNode parent = 3; }",
        );
        assert_eq!(check_file(&ws, "file:///w/tree.proto"), Vec::new());
    }

    #[test]
    fn resolvable_but_unimported_type_names_the_import_to_add() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/types.proto",
            "syntax = \"proto3\";\npackage shared;\nmessage Money {}",
        );
        add(
            &mut ws,
            "file:///w/order.proto",
            "syntax = \"proto3\";\npackage shop;\nmessage Order { shared.Money total = 1; }",
        );
        let diags = diagnostics_of_kind(&ws, "file:///w/order.proto", DiagnosticKind::Reference);
        assert_eq!(diags.len(), 1);
        assert!(diags[0]
            .message
            .contains("not imported, add import \"types.proto\""));
        assert_eq!(diags[0].data.as_deref(), Some("types.proto"));
    }

    #[test]
    fn missing_registry_import_suppresses_unknown_type_noise() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\nimport \"buf/validate/validate.proto\";\nmessage M { ValidateThing v = 1; }",
        );
        let diags = check_file(&ws, "file:///w/a.proto");
        let imports: Vec<_> = diags
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Import)
            .collect();
        let references: Vec<_> = diags
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Reference)
            .collect();
        assert_eq!(imports.len(), 1);
        assert!(imports[0].message.contains("Buf registry dependency"));
        assert!(references.is_empty());
    }

    #[test]
    fn deprecated_message_use_is_flagged() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/old.proto",
            "syntax = \"proto3\";\npackage old;\nmessage Legacy { option deprecated = true; }",
        );
        add(
            &mut ws,
            "file:///w/new.proto",
            "syntax = \"proto3\";\npackage new;\nimport \"old.proto\";\nmessage Fresh { old.Legacy l = 1; }",
        );
        let diags = diagnostics_of_kind(&ws, "file:///w/new.proto", DiagnosticKind::Deprecated);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "'old.Legacy' is deprecated");
        assert_eq!(diags[0].severity, Severity::Warning);
    }

    #[test]
    fn well_known_type_with_import_is_clean() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\nimport \"google/protobuf/timestamp.proto\";\nmessage M { google.protobuf.Timestamp at = 1; }",
        );
        assert_eq!(check_file(&ws, "file:///w/a.proto"), Vec::new());
    }

    #[test]
    fn well_known_type_without_import_requires_one() {
        let mut ws = Workspace::new();
        add(
            &mut ws,
            "file:///w/a.proto",
            "syntax = \"proto3\";\nmessage M { google.protobuf.Timestamp at = 1; }",
        );
        let diags = diagnostics_of_kind(&ws, "file:///w/a.proto", DiagnosticKind::Reference);
        assert_eq!(diags.len(), 1);
        assert!(diags[0]
            .message
            .contains("add import \"google/protobuf/timestamp.proto\""));
    }
}
