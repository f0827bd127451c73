//! CEL expression completion inside `buf.validate` option strings.

use once_cell::sync::Lazy;

use crate::symbol::SymbolKind;
use crate::uri::normalize_uri;
use crate::workspace::Workspace;

use super::container::detect_container;
use super::{edit_range_for, CompletionItem, CompletionItemKind, CompletionRequest, TextEdit};

/// The CEL built-ins offered inside validation expressions.
static CEL_BUILTINS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("has", "has(field) — whether a field is set"),
        ("size", "size(x) — length of a string, bytes, list or map"),
        ("startsWith", "string.startsWith(prefix)"),
        ("endsWith", "string.endsWith(suffix)"),
        ("contains", "string.contains(substring)"),
        ("matches", "string.matches(re2_pattern)"),
        ("all", "list.all(x, predicate)"),
        ("exists", "list.exists(x, predicate)"),
        ("exists_one", "list.exists_one(x, predicate)"),
        ("filter", "list.filter(x, predicate)"),
        ("map", "list.map(x, transform)"),
        ("int", "int(x) — convert to int"),
        ("uint", "uint(x) — convert to uint"),
        ("double", "double(x) — convert to double"),
        ("string", "string(x) — convert to string"),
        ("bool", "bool(x) — convert to bool"),
        ("bytes", "bytes(x) — convert to bytes"),
        ("duration", "duration(s) — parse a duration like '1h30m'"),
        ("timestamp", "timestamp(s) — parse an RFC 3339 timestamp"),
        ("getSeconds", "timestamp.getSeconds()"),
        ("this", "the value being validated"),
    ]
});

/// Detects a cursor inside the double-quoted expression string of a
/// `buf.validate` option and emits CEL candidates.
pub(super) fn detect(
    workspace: &Workspace,
    request: &CompletionRequest,
) -> Option<Vec<CompletionItem>> {
    let line = &request.line_before_cursor;
    // Inside a string: an odd number of quotes before the cursor.
    if line.matches('"').count() % 2 == 0 {
        return None;
    }
    if !in_validate_block(request) {
        return None;
    }

    let word = trailing_expression_path(line);
    if let Some(rest) = word.strip_prefix("this.") {
        return Some(field_items(workspace, request, rest));
    }

    let edit_range = edit_range_for(request.position, word);
    let items = CEL_BUILTINS
        .iter()
        .map(|(name, doc)| CompletionItem {
            label: (*name).to_string(),
            kind: if *name == "this" {
                CompletionItemKind::Value
            } else {
                CompletionItemKind::Function
            },
            detail: Some("CEL".to_string()),
            documentation: Some((*doc).to_string()),
            insert_text: Some((*name).to_string()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: (*name).to_string(),
            }),
            sort_text: Some(format!(
                "{}_{name}",
                if *name == "this" { "0" } else { "1" },
            )),
            filter_text: Some((*name).to_string()),
            label_description: None,
        })
        .collect();
    Some(items)
}

fn in_validate_block(request: &CompletionRequest) -> bool {
    if request.line_before_cursor.contains("buf.validate") {
        return true;
    }
    let Some(document) = request.full_document.as_deref() else {
        return false;
    };
    // Look back from the cursor for an option block that mentions
    // buf.validate and has not been closed yet.
    let mut upto = String::new();
    for (line_no, line) in document.split('\n').enumerate() {
        if line_no as u32 == request.position.line {
            upto.push_str(&request.line_before_cursor);
            break;
        }
        upto.push_str(line);
        upto.push('\n');
    }
    match upto.rfind("buf.validate") {
        Some(idx) => {
            let tail = &upto[idx..];
            let opens = tail.matches(|ch| ch == '[' || ch == '{').count();
            let closes = tail.matches(|ch| ch == ']' || ch == '}').count();
            opens > closes || !tail.contains(';')
        }
        None => false,
    }
}

/// The dotted identifier path being typed, e.g. `this.use` or `sta`.
fn trailing_expression_path(line: &str) -> &str {
    let boundary = line
        .rfind(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'))
        .map(|idx| idx + 1)
        .unwrap_or(0);
    &line[boundary..]
}

/// Completion for `this.<field>`: the enclosing message's fields.
fn field_items(
    workspace: &Workspace,
    request: &CompletionRequest,
    partial: &str,
) -> Vec<CompletionItem> {
    let Some(document) = request.full_document.as_deref() else {
        return Vec::new();
    };
    let Some(container) = detect_container(document, request.position) else {
        return Vec::new();
    };
    let uri = normalize_uri(&request.uri);
    // The container name is simple; find the matching message declared in
    // this file to get its fully-qualified name.
    let Some(message) = workspace
        .symbols_in_file(&uri)
        .into_iter()
        .find(|s| s.kind == SymbolKind::Message && s.name == container.name)
    else {
        return Vec::new();
    };
    let message_full = message.full_name.clone();

    let edit_range = edit_range_for(request.position, partial);
    workspace
        .symbols_in_file(&uri)
        .into_iter()
        .filter(|s| s.kind == SymbolKind::Field)
        .filter(|s| s.container_name.as_deref() == Some(message_full.as_str()))
        .map(|field| CompletionItem {
            label: field.name.clone(),
            kind: CompletionItemKind::Field,
            detail: Some(format!("field of {message_full}")),
            documentation: field.documentation.clone(),
            insert_text: Some(field.name.clone()),
            text_edit: Some(TextEdit {
                range: edit_range,
                new_text: field.name.clone(),
            }),
            sort_text: Some(format!("0_{}", field.name)),
            filter_text: Some(field.name.clone()),
            label_description: Some(message_full.clone()),
        })
        .collect()
}
