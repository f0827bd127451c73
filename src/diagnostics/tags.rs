//! Tag number, reserved range and enum value validation.

use std::collections::HashMap;

use protonav_parse::ast::{
    EnumDefinition, MessageDefinition, ProtoFile, Range, SyntaxLevel, IMPL_RESERVED_END,
    IMPL_RESERVED_START, MAX_FIELD_NUMBER, MIN_FIELD_NUMBER,
};

use super::{Diagnostic, DiagnosticKind, Severity};

pub(super) fn check(file: &ProtoFile, out: &mut Vec<Diagnostic>) {
    let level = file.syntax_level();
    for message in &file.messages {
        check_message(message, level, out);
    }
    for item in &file.enums {
        check_enum(item, level, out);
    }
}

fn check_message(message: &MessageDefinition, level: SyntaxLevel, out: &mut Vec<Diagnostic>) {
    check_numbers(message, out);
    check_reserved_names(message, out);
    check_extension_ranges(message, out);
    for item in &message.nested_enums {
        check_enum(item, level, out);
    }
    for nested in &message.nested_messages {
        check_message(nested, level, out);
    }
    for group in &message.groups {
        check_message(&group.body, level, out);
    }
}

/// One direct-child field slot of a message: ordinary fields, map fields,
/// oneof members and groups all share the message's number namespace.
struct Slot<'a> {
    name: &'a str,
    number: i64,
    range: Range,
}

fn direct_slots(message: &MessageDefinition) -> Vec<Slot<'_>> {
    let mut slots: Vec<(Slot<'_>, protonav_parse::ast::Position)> = Vec::new();
    for field in &message.fields {
        slots.push((
            Slot {
                name: &field.name,
                number: field.number,
                range: field.number_range,
            },
            field.range.start,
        ));
    }
    for map in &message.maps {
        slots.push((
            Slot {
                name: &map.name,
                number: map.number,
                range: map.number_range,
            },
            map.range.start,
        ));
    }
    for oneof in &message.oneofs {
        for field in &oneof.fields {
            slots.push((
                Slot {
                    name: &field.name,
                    number: field.number,
                    range: field.number_range,
                },
                field.range.start,
            ));
        }
    }
    for group in &message.groups {
        slots.push((
            Slot {
                name: &group.name,
                number: group.number,
                range: group.number_range,
            },
            group.range.start,
        ));
    }
    slots.sort_by_key(|(_, start)| *start);
    slots.into_iter().map(|(slot, _)| slot).collect()
}

fn check_numbers(message: &MessageDefinition, out: &mut Vec<Diagnostic>) {
    let slots = direct_slots(message);
    let mut first_use: HashMap<i64, &str> = HashMap::new();
    let mut previous: Option<i64> = None;
    let mut ordering_reported = false;

    for slot in &slots {
        if slot.number < MIN_FIELD_NUMBER || slot.number > MAX_FIELD_NUMBER {
            out.push(Diagnostic::new(
                slot.range,
                Severity::Error,
                DiagnosticKind::TagNumber,
                format!(
                    "field number {} is out of range [{MIN_FIELD_NUMBER}, {MAX_FIELD_NUMBER}]",
                    slot.number,
                ),
            ));
        } else if (IMPL_RESERVED_START..=IMPL_RESERVED_END).contains(&slot.number) {
            out.push(Diagnostic::new(
                slot.range,
                Severity::Error,
                DiagnosticKind::TagNumber,
                format!(
                    "field number {} is in the range {IMPL_RESERVED_START}-{IMPL_RESERVED_END} reserved for the protobuf implementation",
                    slot.number,
                ),
            ));
        } else if message.reserved_contains(slot.number) {
            out.push(Diagnostic::new(
                slot.range,
                Severity::Error,
                DiagnosticKind::TagNumber,
                format!("field number {} is reserved", slot.number),
            ));
        } else if message.extension_contains(slot.number) {
            out.push(Diagnostic::new(
                slot.range,
                Severity::Error,
                DiagnosticKind::TagNumber,
                format!("field number {} overlaps an extension range", slot.number),
            ));
        }

        match first_use.get(&slot.number) {
            Some(first) => {
                out.push(Diagnostic::new(
                    slot.range,
                    Severity::Error,
                    DiagnosticKind::TagNumber,
                    format!(
                        "field number {} is already used by '{first}'",
                        slot.number,
                    ),
                ));
            }
            None => {
                first_use.insert(slot.number, slot.name);
            }
        }

        if let Some(prev) = previous {
            if slot.number < prev && !ordering_reported {
                out.push(Diagnostic::new(
                    slot.range,
                    Severity::Warning,
                    DiagnosticKind::NonIncreasing,
                    format!(
                        "field number {} is lower than the preceding field number {prev}",
                        slot.number,
                    ),
                ));
                ordering_reported = true;
            }
        }
        previous = Some(slot.number);
    }
}

fn check_reserved_names(message: &MessageDefinition, out: &mut Vec<Diagnostic>) {
    let reserved: Vec<&str> = message.reserved_names().collect();
    if reserved.is_empty() {
        return;
    }
    let mut flag = |name: &str, range: Range| {
        if reserved.contains(&name) {
            out.push(Diagnostic::new(
                range,
                Severity::Error,
                DiagnosticKind::TagNumber,
                format!("field name '{name}' is reserved"),
            ));
        }
    };
    for field in &message.fields {
        flag(&field.name, field.name_range);
    }
    for map in &message.maps {
        flag(&map.name, map.name_range);
    }
    for oneof in &message.oneofs {
        for field in &oneof.fields {
            flag(&field.name, field.name_range);
        }
    }
}

fn check_extension_ranges(message: &MessageDefinition, out: &mut Vec<Diagnostic>) {
    let ranges: Vec<_> = message
        .extensions
        .iter()
        .flat_map(|e| &e.ranges)
        .collect();
    for (idx, a) in ranges.iter().enumerate() {
        for b in &ranges[idx + 1..] {
            if a.overlaps(b) {
                out.push(Diagnostic::new(
                    b.range,
                    Severity::Error,
                    DiagnosticKind::ExtensionRange,
                    format!(
                        "extension range {} overlaps an earlier extension range",
                        describe_range(b.start, b.end),
                    ),
                ));
            }
        }
    }
}

fn describe_range(start: i64, end: Option<i64>) -> String {
    match end {
        Some(end) if end == start => format!("{start}"),
        Some(end) => format!("{start} to {end}"),
        None => format!("{start} to max"),
    }
}

fn check_enum(item: &EnumDefinition, level: SyntaxLevel, out: &mut Vec<Diagnostic>) {
    if level == SyntaxLevel::Proto3 {
        if let Some(first) = item.values.first() {
            if first.number != 0 {
                out.push(Diagnostic::new(
                    first.number_range,
                    Severity::Warning,
                    DiagnosticKind::Enum,
                    "First enum value should be 0",
                ));
            }
        }
    }

    let allow_alias = item.allows_alias();
    let mut first_use: HashMap<i64, &str> = HashMap::new();
    for value in &item.values {
        match first_use.get(&value.number) {
            Some(first) if !allow_alias => {
                out.push(Diagnostic::new(
                    value.number_range,
                    Severity::Error,
                    DiagnosticKind::Enum,
                    format!(
                        "enum value number {} is already used by '{first}'; set allow_alias to permit aliases",
                        value.number,
                    ),
                ));
            }
            Some(_) => {}
            None => {
                first_use.insert(value.number, &value.name);
            }
        }
    }

    let reserved_numbers: Vec<_> = item
        .reserved
        .iter()
        .flat_map(|r| &r.numbers)
        .collect();
    let reserved_names: Vec<&str> = item
        .reserved
        .iter()
        .flat_map(|r| &r.names)
        .map(|(name, _)| name.as_str())
        .collect();
    for value in &item.values {
        if reserved_numbers.iter().any(|r| r.contains(value.number)) {
            out.push(Diagnostic::new(
                value.number_range,
                Severity::Error,
                DiagnosticKind::Enum,
                format!("enum value number {} is reserved", value.number),
            ));
        }
        if reserved_names.contains(&value.name.as_str()) {
            out.push(Diagnostic::new(
                value.name_range,
                Severity::Error,
                DiagnosticKind::Enum,
                format!("enum value name '{}' is reserved", value.name),
            ));
        }
    }
}
