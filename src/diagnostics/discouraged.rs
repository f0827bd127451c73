//! Legacy and out-of-place construct checks: `required`, groups, and
//! `optional` labels outside proto2.

use protonav_parse::ast::{
    FieldDefinition, FieldModifier, MessageDefinition, ProtoFile, SyntaxLevel,
};

use super::{Diagnostic, DiagnosticKind, Severity};

pub(super) fn check(file: &ProtoFile, out: &mut Vec<Diagnostic>) {
    let level = file.syntax_level();
    for message in &file.messages {
        check_message(message, level, out);
    }
    for extend in &file.extends {
        for field in &extend.fields {
            check_field(field, level, out);
        }
    }
}

fn check_message(message: &MessageDefinition, level: SyntaxLevel, out: &mut Vec<Diagnostic>) {
    for field in &message.fields {
        check_field(field, level, out);
    }
    for group in &message.groups {
        out.push(Diagnostic::new(
            group.name_range,
            Severity::Warning,
            DiagnosticKind::Discouraged,
            "groups are deprecated; use a nested message instead",
        ));
        check_message(&group.body, level, out);
    }
    for nested in &message.nested_messages {
        check_message(nested, level, out);
    }
    for extend in &message.extends {
        for field in &extend.fields {
            check_field(field, level, out);
        }
    }
}

fn check_field(field: &FieldDefinition, level: SyntaxLevel, out: &mut Vec<Diagnostic>) {
    match field.modifier {
        FieldModifier::Required => match level {
            SyntaxLevel::Proto2 => out.push(Diagnostic::new(
                field.range,
                Severity::Warning,
                DiagnosticKind::Discouraged,
                "'required' is discouraged; it cannot be removed compatibly later",
            )),
            _ => out.push(Diagnostic::new(
                field.range,
                Severity::Error,
                DiagnosticKind::Discouraged,
                "'required' fields are only allowed in proto2",
            )),
        },
        FieldModifier::Optional => match level {
            SyntaxLevel::Proto2 => {}
            SyntaxLevel::Proto3 => out.push(Diagnostic::new(
                field.range,
                Severity::Info,
                DiagnosticKind::Discouraged,
                "explicit 'optional' tracks field presence in proto3; omit it unless presence matters",
            )),
            SyntaxLevel::Edition => out.push(Diagnostic::new(
                field.range,
                Severity::Warning,
                DiagnosticKind::Discouraged,
                "'optional' labels are not used under editions; use the field_presence feature",
            )),
        },
        FieldModifier::None | FieldModifier::Repeated => {}
    }
}

#[cfg(test)]
mod tests {
    use super::super::{check_file, Diagnostic, DiagnosticKind, Severity};
    use crate::workspace::Workspace;

    fn discouraged(text: &str) -> Vec<Diagnostic> {
        let mut ws = Workspace::new();
        let uri = "file:///w/d.proto";
        ws.update_file(uri, protonav_parse::parse(uri, text)).unwrap();
        check_file(&ws, uri)
            .into_iter()
            .filter(|d| d.kind == DiagnosticKind::Discouraged)
            .collect()
    }

    #[test]
    fn proto2_required_is_a_warning() {
        let diags = discouraged(
            "syntax = \"proto2\";\nmessage M {\n  required string name = 1;\n}\n",
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert!(diags[0].message.contains("'required' is discouraged"));
    }

    #[test]
    fn proto3_required_is_an_error() {
        let diags = discouraged(
            "syntax = \"proto3\";\nmessage M {\n  required string name = 1;\n}\n",
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn proto3_optional_is_informational() {
        let diags = discouraged(
            "syntax = \"proto3\";\nmessage M {\n  optional string name = 1;\n}\n",
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Info);
    }

    #[test]
    fn editions_optional_is_a_warning() {
        let diags = discouraged(
            "edition = \"2023\";\nmessage M {\n  optional string name = 1;\n}\n",
        );
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("field_presence"));
    }

    #[test]
    fn proto2_optional_is_fine_and_groups_are_not() {
        let diags = discouraged(
            "syntax = \"proto2\";\nmessage M {\n  optional string name = 1;\n  optional group Extra = 2 {\n    optional int32 x = 3;\n  }\n}\n",
        );
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("groups are deprecated"));
    }
}
