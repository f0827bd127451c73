//! Naming convention checks.
//!
//! Messages, enums and services are expected in PascalCase, fields in
//! snake_case, enum values in SCREAMING_SNAKE_CASE. A field written in
//! SCREAMING_SNAKE_CASE is left alone: it is a deliberate style, not a
//! snake_case typo.

use heck::{ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};

use protonav_parse::ast::{EnumDefinition, MessageDefinition, ProtoFile, Range};

use super::{Diagnostic, DiagnosticKind, Severity};

pub(super) fn check(file: &ProtoFile, out: &mut Vec<Diagnostic>) {
    for message in &file.messages {
        check_message(message, out);
    }
    for item in &file.enums {
        check_enum(item, out);
    }
    for service in &file.services {
        check_pascal("service", &service.name, service.name_range, out);
        for rpc in &service.rpcs {
            check_pascal("rpc", &rpc.name, rpc.name_range, out);
        }
    }
}

fn check_message(message: &MessageDefinition, out: &mut Vec<Diagnostic>) {
    check_pascal("message", &message.name, message.name_range, out);
    for field in &message.fields {
        check_snake(&field.name, field.name_range, out);
    }
    for map in &message.maps {
        check_snake(&map.name, map.name_range, out);
    }
    for oneof in &message.oneofs {
        check_snake(&oneof.name, oneof.name_range, out);
        for field in &oneof.fields {
            check_snake(&field.name, field.name_range, out);
        }
    }
    for group in &message.groups {
        check_pascal("group", &group.name, group.name_range, out);
        check_message(&group.body, out);
    }
    for nested in &message.nested_messages {
        check_message(nested, out);
    }
    for item in &message.nested_enums {
        check_enum(item, out);
    }
}

fn check_enum(item: &EnumDefinition, out: &mut Vec<Diagnostic>) {
    check_pascal("enum", &item.name, item.name_range, out);
    for value in &item.values {
        if value.name != value.name.to_shouty_snake_case() {
            out.push(Diagnostic::new(
                value.name_range,
                Severity::Warning,
                DiagnosticKind::Naming,
                format!(
                    "enum value '{}' should be SCREAMING_SNAKE_CASE, e.g. '{}'",
                    value.name,
                    value.name.to_shouty_snake_case(),
                ),
            ));
        }
    }
}

fn check_pascal(what: &str, name: &str, range: Range, out: &mut Vec<Diagnostic>) {
    if name.is_empty() || name == name.to_upper_camel_case() {
        return;
    }
    out.push(Diagnostic::new(
        range,
        Severity::Warning,
        DiagnosticKind::Naming,
        format!(
            "{what} '{name}' should be PascalCase, e.g. '{}'",
            name.to_upper_camel_case(),
        ),
    ));
}

fn check_snake(name: &str, range: Range, out: &mut Vec<Diagnostic>) {
    if name.is_empty() || name == name.to_snake_case() {
        return;
    }
    // Deliberate SCREAMING_SNAKE_CASE passes.
    if name == name.to_shouty_snake_case() {
        return;
    }
    out.push(Diagnostic::new(
        range,
        Severity::Warning,
        DiagnosticKind::Naming,
        format!("field '{name}' should be snake_case, e.g. '{}'", name.to_snake_case()),
    ));
}

#[cfg(test)]
mod tests {
    use super::super::{check_file, Diagnostic, DiagnosticKind};
    use crate::workspace::Workspace;

    fn naming_diagnostics(text: &str) -> Vec<Diagnostic> {
        let mut ws = Workspace::new();
        let uri = "file:///w/n.proto";
        ws.update_file(uri, protonav_parse::parse(uri, text)).unwrap();
        check_file(&ws, uri)
            .into_iter()
            .filter(|d| d.kind == DiagnosticKind::Naming)
            .collect()
    }

    #[test]
    fn conventional_names_pass() {
        let diags = naming_diagnostics(
            "syntax = \"proto3\";\nmessage UserProfile {\n  string display_name = 1;\n}\nenum Color {\n  COLOR_UNSPECIFIED = 0;\n}\n",
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn flags_each_convention() {
        let diags = naming_diagnostics(
            "syntax = \"proto3\";\nmessage user_profile {\n  string DisplayName = 1;\n}\nenum Color {\n  unspecified = 0;\n}\n",
        );
        assert!(diags.iter().any(|d| d.message.contains("'user_profile' should be PascalCase")));
        assert!(diags.iter().any(|d| d.message.contains("'DisplayName' should be snake_case")));
        assert!(diags.iter().any(|d| d.message.contains("'unspecified' should be SCREAMING_SNAKE_CASE")));
    }

    #[test]
    fn screaming_snake_fields_are_not_flagged() {
        let diags = naming_diagnostics(
            "syntax = \"proto3\";\nmessage M {\n  string LEGACY_NAME = 1;\n}\n",
        );
        assert!(diags.is_empty());
    }
}
