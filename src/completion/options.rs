//! Option key completion: standard descriptor options per surface, the
//! `buf.validate` field-constraint taxonomy, and `google.api` annotations.

use once_cell::sync::Lazy;

use super::container::{ContainerContext, ContainerKind};
use super::{edit_range_for, CompletionItem, CompletionItemKind, CompletionRequest, TextEdit};

const FILE_OPTIONS: &[&str] = &[
    "cc_enable_arenas",
    "csharp_namespace",
    "deprecated",
    "go_package",
    "java_multiple_files",
    "java_outer_classname",
    "java_package",
    "objc_class_prefix",
    "optimize_for",
    "php_namespace",
    "ruby_package",
];

const MESSAGE_OPTIONS: &[&str] = &["deprecated", "message_set_wire_format", "no_standard_descriptor_accessor"];

const ENUM_OPTIONS: &[&str] = &["allow_alias", "deprecated"];

const SERVICE_OPTIONS: &[&str] = &["deprecated"];

const RPC_OPTIONS: &[&str] = &["deprecated", "idempotency_level", "(google.api.http)", "(google.api.method_signature)"];

const FIELD_OPTIONS: &[&str] = &[
    "deprecated",
    "json_name",
    "lazy",
    "packed",
    "(buf.validate.field)",
    "(google.api.field_behavior)",
    "(google.api.resource_reference)",
];

/// `buf.validate.field.<kind>.<constraint>` taxonomy.
static BUF_VALIDATE_KINDS: Lazy<Vec<(&'static str, Vec<&'static str>)>> = Lazy::new(|| {
    let numeric = vec!["const", "lt", "lte", "gt", "gte", "in", "not_in"];
    let mut float = numeric.clone();
    float.push("finite");
    vec![
        (
            "string",
            vec![
                "const", "min_len", "max_len", "len", "pattern", "prefix", "suffix", "contains",
                "not_contains", "email", "hostname", "ip", "ipv4", "ipv6", "uri", "uuid", "in",
                "not_in",
            ],
        ),
        (
            "bytes",
            vec!["const", "min_len", "max_len", "len", "pattern", "prefix", "suffix", "contains", "in", "not_in"],
        ),
        ("int32", numeric.clone()),
        ("int64", numeric.clone()),
        ("uint32", numeric.clone()),
        ("uint64", numeric.clone()),
        ("sint32", numeric.clone()),
        ("sint64", numeric.clone()),
        ("fixed32", numeric.clone()),
        ("fixed64", numeric.clone()),
        ("sfixed32", numeric.clone()),
        ("sfixed64", numeric),
        ("float", float.clone()),
        ("double", float),
        ("bool", vec!["const"]),
        ("enum", vec!["const", "defined_only", "in", "not_in"]),
        ("repeated", vec!["min_items", "max_items", "unique", "items"]),
        ("map", vec!["min_pairs", "max_pairs", "keys", "values"]),
        ("timestamp", vec!["const", "lt", "lte", "gt", "gte", "lt_now", "gt_now", "within"]),
        ("duration", vec!["const", "lt", "lte", "gt", "gte", "in", "not_in"]),
    ]
});

/// Shared `buf.validate.field` members that are not scalar-kind blocks.
const BUF_VALIDATE_SHARED: &[&str] = &["cel", "required", "ignore"];

const FIELD_BEHAVIOR_VALUES: &[&str] = &[
    "FIELD_BEHAVIOR_UNSPECIFIED",
    "OPTIONAL",
    "REQUIRED",
    "OUTPUT_ONLY",
    "INPUT_ONLY",
    "IMMUTABLE",
    "UNORDERED_LIST",
];

const HTTP_RULE_KEYS: &[&str] = &["get", "put", "post", "delete", "patch", "custom", "body", "response_body", "additional_bindings"];

pub(super) fn detect(
    request: &CompletionRequest,
    container: Option<&ContainerContext>,
) -> Option<Vec<CompletionItem>> {
    let line = &request.line_before_cursor;
    let trimmed = line.trim_start();
    let in_brackets = line.matches('[').count() > line.matches(']').count();
    let is_option_statement =
        trimmed == "option" || trimmed.starts_with("option ") && !trimmed.contains('=');
    if !in_brackets && !is_option_statement {
        return None;
    }

    // The option currently being typed: everything after the last `[` or
    // `,`. Once it contains `=` the cursor sits in value position.
    let current_option = trimmed
        .rsplit(|ch| ch == '[' || ch == ',')
        .next()
        .unwrap_or(trimmed);
    if in_brackets && current_option.contains('=') {
        // `(google.api.field_behavior) = ` takes enum values, not keys.
        if current_option.contains("(google.api.field_behavior)") {
            let prefix = option_word(line);
            return Some(plain_items(
                request,
                prefix,
                FIELD_BEHAVIOR_VALUES,
                CompletionItemKind::EnumMember,
            ));
        }
        // A value position we have no catalog for.
        return Some(Vec::new());
    }

    let prefix = option_word(line);

    // Dotted custom-option paths.
    if let Some(rest) = prefix.strip_prefix("(buf.validate.field).") {
        return Some(buf_validate_items(request, rest));
    }
    if prefix.starts_with("(google.api.http).") {
        return Some(plain_items(
            request,
            last_segment(prefix),
            HTTP_RULE_KEYS,
            CompletionItemKind::Property,
        ));
    }

    let catalog: &[&str] = if in_brackets {
        FIELD_OPTIONS
    } else {
        match container.map(|c| c.kind) {
            None => FILE_OPTIONS,
            Some(ContainerKind::Message) => MESSAGE_OPTIONS,
            Some(ContainerKind::Enum) => ENUM_OPTIONS,
            Some(ContainerKind::Service) => {
                if trimmed.contains("rpc") {
                    RPC_OPTIONS
                } else {
                    SERVICE_OPTIONS
                }
            }
        }
    };
    Some(plain_items(request, prefix, catalog, CompletionItemKind::Property))
}

fn buf_validate_items(request: &CompletionRequest, rest: &str) -> Vec<CompletionItem> {
    match rest.split_once('.') {
        // `(buf.validate.field).string.` → the string constraints.
        Some((kind, partial)) => {
            let constraints = BUF_VALIDATE_KINDS
                .iter()
                .find(|(name, _)| *name == kind)
                .map(|(_, constraints)| constraints.as_slice())
                .unwrap_or(&[]);
            plain_items(request, partial, constraints, CompletionItemKind::Property)
        }
        // `(buf.validate.field).` → scalar kinds plus shared members.
        None => {
            let mut names: Vec<&str> = BUF_VALIDATE_KINDS.iter().map(|(name, _)| *name).collect();
            names.extend_from_slice(BUF_VALIDATE_SHARED);
            plain_items(request, rest, &names, CompletionItemKind::Property)
        }
    }
}

fn plain_items(
    request: &CompletionRequest,
    prefix: &str,
    names: &[&str],
    kind: CompletionItemKind,
) -> Vec<CompletionItem> {
    let edit_range = edit_range_for(request.position, prefix);
    names
        .iter()
        .map(|name| CompletionItem {
            label: (*name).to_string(),
            kind,
            detail: None,
            documentation: None,
            insert_text: Some((*name).to_string()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: (*name).to_string(),
            }),
            sort_text: Some(format!("0_{name}")),
            filter_text: Some((*name).to_string()),
            label_description: None,
        })
        .collect()
}

/// The option path being typed, parentheses included.
fn option_word(line: &str) -> &str {
    let boundary = line
        .rfind(|ch: char| {
            !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '(' || ch == ')')
        })
        .map(|idx| idx + 1)
        .unwrap_or(0);
    &line[boundary..]
}

fn last_segment(prefix: &str) -> &str {
    prefix.rsplit('.').next().unwrap_or("")
}
