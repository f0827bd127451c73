//! Field declaration line analysis: type completion, field-name
//! suggestions, and the classification shared with number completion.

use heck::ToSnakeCase;

use protonav_parse::ast::SCALAR_TYPES;

use crate::symbol::SymbolInfo;
use crate::uri::normalize_uri;
use crate::workspace::Workspace;

use super::{edit_range_for, CompletionItem, CompletionItemKind, CompletionRequest, TextEdit};

/// Statement keywords that rule a line out of field completion.
const STATEMENT_KEYWORDS: &[&str] = &[
    "option", "reserved", "extensions", "import", "syntax", "edition", "package", "oneof",
    "extend", "rpc", "service", "message", "enum", "returns",
];

const MODIFIERS: &[&str] = &["optional", "required", "repeated"];

/// What a partially-typed field line is asking for.
#[derive(Debug, PartialEq)]
pub(super) enum FieldLine<'a> {
    /// Typing the type (or nothing yet): complete types.
    Type { prefix: &'a str },
    /// Type complete, typing or about to type the name.
    Name {
        field_type: &'a str,
        prefix: &'a str,
    },
    /// Name complete: suggest `= N;`.
    Number,
    /// Cursor after `=`: suggest the bare number.
    NumberAfterEquals,
}

pub(super) fn classify_field_line(line: &str) -> Option<FieldLine<'_>> {
    let trimmed = line.trim_start();
    if trimmed.trim_end().ends_with('=') {
        return Some(FieldLine::NumberAfterEquals);
    }
    if trimmed.contains('=') {
        return None;
    }

    // A half-typed map value type: complete types after `<` or `,`.
    if trimmed.starts_with("map") && trimmed.contains('<') && !trimmed.contains('>') {
        let prefix = word_suffix(trimmed);
        return Some(FieldLine::Type { prefix });
    }

    let ends_with_space = line.is_empty() || line.ends_with(char::is_whitespace);

    // A complete map type counts as one type token.
    if trimmed.starts_with("map") && trimmed.contains('>') {
        let close = trimmed.find('>').unwrap();
        let field_type = &trimmed[..close + 1];
        let rest = trimmed[close + 1..].trim_start();
        return match (rest.is_empty(), ends_with_space) {
            (true, true) => Some(FieldLine::Name {
                field_type,
                prefix: "",
            }),
            (true, false) => None,
            (false, false) => Some(FieldLine::Name {
                field_type,
                prefix: rest,
            }),
            (false, true) => Some(FieldLine::Number),
        };
    }

    let mut tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if let Some(first) = tokens.first() {
        if STATEMENT_KEYWORDS.contains(first) {
            return None;
        }
        if MODIFIERS.contains(first) {
            tokens.remove(0);
        }
    }
    match (tokens.as_slice(), ends_with_space) {
        ([], _) => Some(FieldLine::Type { prefix: "" }),
        ([partial], false) => Some(FieldLine::Type { prefix: partial }),
        ([field_type], true) => Some(FieldLine::Name {
            field_type,
            prefix: "",
        }),
        ([field_type, partial], false) => Some(FieldLine::Name {
            field_type,
            prefix: partial,
        }),
        ([_, _], true) => Some(FieldLine::Number),
        _ => None,
    }
}

fn word_suffix(text: &str) -> &str {
    let boundary = text
        .rfind(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    &text[boundary..]
}

/// Type completion: scalars plus every reachable message/enum, with
/// qualified prefixes filtering to the qualifier's children.
pub(super) fn type_items(
    workspace: &Workspace,
    request: &CompletionRequest,
    prefix: &str,
) -> Vec<CompletionItem> {
    if let Some((qualifier, partial)) = prefix.rsplit_once('.') {
        return qualified_items(workspace, request, qualifier, partial);
    }

    let edit_range = edit_range_for(request.position, prefix);
    let mut items = Vec::new();
    for scalar in SCALAR_TYPES {
        items.push(CompletionItem {
            label: (*scalar).to_string(),
            kind: CompletionItemKind::Keyword,
            detail: Some("built-in type".to_string()),
            documentation: None,
            insert_text: Some((*scalar).to_string()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: (*scalar).to_string(),
            }),
            sort_text: Some(format!("0_{scalar}")),
            filter_text: Some((*scalar).to_string()),
            label_description: None,
        });
    }

    let uri = normalize_uri(&request.uri);
    let accessible = workspace.accessible_symbols(&uri);
    let mut seen: Vec<&str> = Vec::new();
    for symbol in accessible.iter().filter(|s| s.kind.is_type()) {
        seen.push(symbol.full_name.as_str());
        items.push(type_item(symbol, edit_range, "1"));
    }
    // The rest of the workspace, for discoverability; picking one of these
    // will need an import.
    for symbol in workspace.symbols().filter(|s| s.kind.is_type()) {
        if seen.contains(&symbol.full_name.as_str()) {
            continue;
        }
        let mut item = type_item(symbol, edit_range, "2");
        item.detail = Some(format!("{} (needs import)", symbol.full_name));
        items.push(item);
    }
    items
}

fn type_item(symbol: &SymbolInfo, edit_range: protonav_parse::ast::Range, bucket: &str) -> CompletionItem {
    CompletionItem {
        label: symbol.name.clone(),
        kind: kind_of(symbol),
        detail: Some(symbol.full_name.clone()),
        documentation: symbol.documentation.clone(),
        insert_text: Some(symbol.name.clone()),
        text_edit: Some(TextEdit {
            range: edit_range,
            new_text: symbol.name.clone(),
        }),
        sort_text: Some(format!("{bucket}_{}", symbol.name)),
        filter_text: Some(format!("{} {}", symbol.name, symbol.full_name)),
        label_description: symbol.container_name.clone(),
    }
}

fn kind_of(symbol: &SymbolInfo) -> CompletionItemKind {
    match symbol.kind {
        crate::symbol::SymbolKind::Enum => CompletionItemKind::Enum,
        _ => CompletionItemKind::Class,
    }
}

/// Completion after a dotted qualifier: only the qualifier's direct
/// children appear, labelled with the qualifier as their description.
fn qualified_items(
    workspace: &Workspace,
    request: &CompletionRequest,
    qualifier: &str,
    partial: &str,
) -> Vec<CompletionItem> {
    let uri = normalize_uri(&request.uri);
    let package = workspace
        .file(&uri)
        .map(|f| f.package_name().to_string())
        .unwrap_or_default();

    // The qualifier may be a package, a (possibly relative) type, or a
    // package suffix relative to the current package.
    let mut expansions: Vec<String> = vec![qualifier.to_string()];
    if let Some(symbol) = workspace.resolve_type(qualifier, &uri, Some(&package)) {
        expansions.push(symbol.full_name.clone());
    }
    if !package.is_empty() {
        expansions.push(format!("{package}.{qualifier}"));
    }

    let edit_range = edit_range_for(request.position, partial);
    let mut items = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for expansion in &expansions {
        let prefix = format!("{expansion}.");
        for symbol in workspace.symbols().filter(|s| s.kind.is_type()) {
            let Some(rest) = symbol.full_name.strip_prefix(&prefix) else {
                continue;
            };
            if rest.contains('.') || seen.contains(&symbol.full_name) {
                continue;
            }
            seen.push(symbol.full_name.clone());
            items.push(CompletionItem {
                label: rest.to_string(),
                kind: kind_of(symbol),
                detail: Some(symbol.full_name.clone()),
                documentation: symbol.documentation.clone(),
                insert_text: Some(rest.to_string()),
                text_edit: Some(TextEdit {
                    range: edit_range,
                    new_text: rest.to_string(),
                }),
                sort_text: Some(format!("0_{rest}")),
                filter_text: Some(symbol.full_name.clone()),
                label_description: Some(expansion.clone()),
            });
        }
    }
    items
}

/// Field-name suggestions derived from the declared type, top five.
pub(super) fn field_name_items(
    request: &CompletionRequest,
    field_type: &str,
) -> Vec<CompletionItem> {
    let names = suggested_names(field_type);
    let edit_range = edit_range_for(request.position, "");
    names
        .into_iter()
        .take(5)
        .enumerate()
        .map(|(idx, name)| CompletionItem {
            label: name.clone(),
            kind: CompletionItemKind::Field,
            detail: Some(format!("{field_type} field")),
            documentation: None,
            insert_text: Some(name.clone()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: name.clone(),
            }),
            sort_text: Some(format!("{idx}_{name}")),
            filter_text: Some(name),
            label_description: None,
        })
        .collect()
}

fn suggested_names(field_type: &str) -> Vec<String> {
    if field_type.starts_with("map<") {
        return ["labels", "annotations", "attributes", "entries", "metadata"]
            .iter()
            .map(|s| s.to_string())
            .collect();
    }
    let simple = field_type.rsplit('.').next().unwrap_or(field_type);
    let fixed: &[&str] = match simple {
        "string" => &["name", "id", "title", "description", "value"],
        "int32" | "int64" | "uint32" | "uint64" | "sint32" | "sint64" => {
            &["count", "size", "total", "index", "version"]
        }
        "bool" => &["enabled", "active", "deleted", "verified"],
        "bytes" => &["data", "payload", "content"],
        "float" | "double" => &["value", "amount", "ratio", "score"],
        "Timestamp" => &["created_at", "updated_at", "deleted_at", "expires_at"],
        "Duration" => &["timeout", "ttl", "duration", "interval"],
        "FieldMask" => &["update_mask", "field_mask", "read_mask"],
        "Any" => &["payload", "details"],
        "Struct" => &["metadata", "attributes"],
        _ => &[],
    };
    if !fixed.is_empty() {
        return fixed.iter().map(|s| s.to_string()).collect();
    }
    // A message or enum type suggests its own snake_case name and
    // id/value-suffixed variants.
    let snake = simple.to_snake_case();
    if snake.is_empty() {
        return Vec::new();
    }
    vec![
        snake.clone(),
        format!("{snake}_id"),
        format!("{snake}_value"),
    ]
}
