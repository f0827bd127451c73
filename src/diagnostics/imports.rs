//! Import statement validation: unresolved, non-canonical and unused
//! imports, with Buf-registry awareness for the unresolved case.

use std::collections::BTreeSet;

use protonav_parse::ast::{is_scalar_type, ProtoFile};

use super::{Diagnostic, DiagnosticKind, Severity};
use crate::registry;
use crate::typeres::for_each_type_reference;
use crate::workspace::Workspace;

pub(super) fn check(workspace: &Workspace, file: &ProtoFile, out: &mut Vec<Diagnostic>) {
    let resolutions = workspace.imports_with_resolutions(&file.uri);
    let used_files = referenced_files(workspace, file);
    let declared = workspace.declared_registry_dependencies();

    for import in &resolutions {
        match &import.resolved {
            None => {
                if registry::is_registry_import(&import.path) {
                    let mut message = format!(
                        "cannot resolve \"{}\": a Buf registry dependency is required",
                        import.path,
                    );
                    if let Some(module) = registry::registry_module(&import.path) {
                        if declared.iter().any(|dep| dep == module) {
                            message.push_str(&format!(
                                "; {module} is declared but not fetched",
                            ));
                        } else {
                            message.push_str(&format!("; add a dependency on {module}"));
                        }
                        out.push(
                            Diagnostic::new(
                                import.path_range,
                                Severity::Error,
                                DiagnosticKind::Import,
                                message,
                            )
                            .with_data(module),
                        );
                    } else {
                        out.push(Diagnostic::new(
                            import.path_range,
                            Severity::Error,
                            DiagnosticKind::Import,
                            message,
                        ));
                    }
                } else {
                    out.push(Diagnostic::new(
                        import.path_range,
                        Severity::Error,
                        DiagnosticKind::Import,
                        format!("cannot resolve import \"{}\"", import.path),
                    ));
                }
            }
            Some(target) => {
                if let Some(expected) = workspace.import_path_for_file(&file.uri, target) {
                    if expected != import.path {
                        out.push(
                            Diagnostic::new(
                                import.path_range,
                                Severity::Warning,
                                DiagnosticKind::Import,
                                format!(
                                    "\"{}\" resolves, but should be imported via \"{expected}\"",
                                    import.path,
                                ),
                            )
                            .with_data(expected),
                        );
                    }
                }
                if !is_exempt_from_unused(&import.path)
                    && !workspace
                        .public_export_closure(target)
                        .iter()
                        .any(|exported| used_files.contains(exported))
                {
                    out.push(
                        Diagnostic::new(
                            import.path_range,
                            Severity::Warning,
                            DiagnosticKind::Import,
                            format!("unused import \"{}\"", import.path),
                        )
                        .with_data(import.path.clone()),
                    );
                }
            }
        }
    }
}

/// Files that some type reference of `file` actually resolves into.
fn referenced_files(workspace: &Workspace, file: &ProtoFile) -> BTreeSet<String> {
    let package = file.package_name().to_string();
    let mut used = BTreeSet::new();
    for_each_type_reference(file, &mut |reference| {
        if reference.name.is_empty() || is_scalar_type(reference.name) {
            return;
        }
        if let Some(symbol) = workspace.resolve_type(reference.name, &file.uri, Some(&package)) {
            used.insert(symbol.location.uri.clone());
        }
    });
    used
}

/// `descriptor.proto` is imported for the side effect of declaring custom
/// options, which no type reference ever points into.
fn is_exempt_from_unused(path: &str) -> bool {
    path == "google/protobuf/descriptor.proto"
}
