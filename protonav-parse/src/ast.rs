//! The typed source model for a single `.proto` file.
//!
//! Every named node carries two ranges: `range` spans the whole construct,
//! `name_range` spans the identifier alone. Editors distinguish "hover on
//! the type name" from "hover anywhere in the declaration", so both are
//! recorded at parse time rather than recomputed later.
//!
//! Positions are expressed in UTF-16 code units to match editor protocols;
//! the lexer transcodes at the boundary and nothing downstream needs to know
//! about bytes.

use std::fmt;

/// Lowest legal field number.
pub const MIN_FIELD_NUMBER: i64 = 1;
/// Highest legal field number (2^29 - 1).
pub const MAX_FIELD_NUMBER: i64 = 536_870_911;
/// First number of the range reserved for the protobuf implementation.
pub const IMPL_RESERVED_START: i64 = 19_000;
/// Last number of the range reserved for the protobuf implementation.
pub const IMPL_RESERVED_END: i64 = 19_999;

/// A point in a document, in UTF-16 code units.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Zero-based line.
    pub line: u32,
    /// Zero-based column, counted in UTF-16 code units.
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Position {
        Position { line, character }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.character)
    }
}

/// A half-open `[start, end)` span of a document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Range {
        Range { start, end }
    }

    /// An empty range anchored at `pos`.
    pub fn empty(pos: Position) -> Range {
        Range {
            start: pos,
            end: pos,
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.start <= pos && pos < self.end
    }

    /// The smallest range covering both `self` and `other`.
    pub fn cover(&self, other: Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Comments attached to a declaration.
///
/// `leading` is the comment block immediately above the declaration with no
/// blank line in between; `trailing` is a comment on the same line after the
/// terminating token.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Comments {
    pub leading: Option<String>,
    pub trailing: Option<String>,
}

impl Comments {
    pub fn is_empty(&self) -> bool {
        self.leading.is_none() && self.trailing.is_none()
    }
}

/// A comment that did not attach to any declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub text: String,
    pub range: Range,
    pub block: bool,
}

/// A syntax error recorded by the parser.
///
/// Parse errors never escape the parser; they ride on the returned tree and
/// the validator turns them into diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNote {
    pub message: String,
    pub range: Range,
}

/// The declared language level of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxVersion {
    Proto2,
    Proto3,
}

impl fmt::Display for SyntaxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxVersion::Proto2 => f.write_str("proto2"),
            SyntaxVersion::Proto3 => f.write_str("proto3"),
        }
    }
}

/// The effective language level after considering defaults and editions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxLevel {
    Proto2,
    Proto3,
    Edition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxDecl {
    pub version: SyntaxVersion,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditionDecl {
    pub value: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageDecl {
    pub name: String,
    pub range: Range,
    pub name_range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportModifier {
    None,
    Public,
    Weak,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    /// The literal path between the quotes, as written.
    pub path: String,
    pub modifier: ImportModifier,
    pub range: Range,
    /// The range of the quoted path literal.
    pub path_range: Range,
    pub comments: Comments,
}

/// The value of an `option` statement or a bracketed field option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Identifier(String),
    /// A `{ … }` text-format block, kept as raw text.
    Aggregate(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Identifier(id) if id == "true" => Some(true),
            OptionValue::Identifier(id) if id == "false" => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionStatement {
    /// Dotted option name; custom options keep their parentheses, e.g.
    /// `(buf.validate.field).string.min_len`.
    pub name: String,
    pub value: OptionValue,
    pub range: Range,
    pub name_range: Range,
    pub value_range: Range,
}

/// Returns `true` when `options` sets `deprecated = true`.
pub fn options_deprecate(options: &[OptionStatement]) -> bool {
    options
        .iter()
        .any(|o| o.name == "deprecated" && o.value.as_bool() == Some(true))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldModifier {
    None,
    Optional,
    Required,
    Repeated,
}

impl FieldModifier {
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            FieldModifier::None => None,
            FieldModifier::Optional => Some("optional"),
            FieldModifier::Required => Some("required"),
            FieldModifier::Repeated => Some("repeated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    /// The textual type as written: scalar keyword, identifier, dotted
    /// qualifier, or leading-dot absolute name. Resolution happens later and
    /// on demand, never here.
    pub field_type: String,
    pub number: i64,
    pub modifier: FieldModifier,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub type_range: Range,
    pub number_range: Range,
    pub comments: Comments,
}

impl FieldDefinition {
    pub fn is_deprecated(&self) -> bool {
        options_deprecate(&self.options)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapFieldDefinition {
    pub name: String,
    pub key_type: String,
    pub value_type: String,
    pub number: i64,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub key_type_range: Range,
    pub value_type_range: Range,
    pub number_range: Range,
    pub comments: Comments,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneofDefinition {
    pub name: String,
    /// Members share the enclosing message's number namespace and carry no
    /// `repeated` modifier; the validator enforces both.
    pub fields: Vec<FieldDefinition>,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub comments: Comments,
}

/// A proto2 `group` field. The group is simultaneously a field (lowercased
/// name, a number) and a nested message type (the capitalized name).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDefinition {
    pub name: String,
    pub modifier: FieldModifier,
    pub number: i64,
    pub body: MessageDefinition,
    pub range: Range,
    pub name_range: Range,
    pub number_range: Range,
    pub comments: Comments,
}

/// One element of a `reserved` or `extensions` statement: either a single
/// number or a `N to M` range, where `end == None` stands for `to max`.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberRange {
    pub start: i64,
    pub end: Option<i64>,
    pub range: Range,
}

impl NumberRange {
    pub fn contains(&self, n: i64) -> bool {
        match self.end {
            Some(end) => self.start <= n && n <= end,
            None => self.start <= n,
        }
    }

    pub fn overlaps(&self, other: &NumberRange) -> bool {
        let self_end = self.end.unwrap_or(i64::MAX);
        let other_end = other.end.unwrap_or(i64::MAX);
        self.start <= other_end && other.start <= self_end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservedStatement {
    pub numbers: Vec<NumberRange>,
    pub names: Vec<(String, Range)>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionsStatement {
    pub ranges: Vec<NumberRange>,
    pub options: Vec<OptionStatement>,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    pub maps: Vec<MapFieldDefinition>,
    pub oneofs: Vec<OneofDefinition>,
    pub nested_messages: Vec<MessageDefinition>,
    pub nested_enums: Vec<EnumDefinition>,
    pub groups: Vec<GroupDefinition>,
    pub reserved: Vec<ReservedStatement>,
    pub extensions: Vec<ExtensionsStatement>,
    pub extends: Vec<ExtendBlock>,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub comments: Comments,
}

impl MessageDefinition {
    pub fn new(name: impl Into<String>) -> MessageDefinition {
        MessageDefinition {
            name: name.into(),
            fields: Vec::new(),
            maps: Vec::new(),
            oneofs: Vec::new(),
            nested_messages: Vec::new(),
            nested_enums: Vec::new(),
            groups: Vec::new(),
            reserved: Vec::new(),
            extensions: Vec::new(),
            extends: Vec::new(),
            options: Vec::new(),
            range: Range::default(),
            name_range: Range::default(),
            comments: Comments::default(),
        }
    }

    pub fn is_deprecated(&self) -> bool {
        options_deprecate(&self.options)
    }

    /// All direct-child field numbers with the range of the number literal,
    /// in source order. Oneof members share the message namespace and are
    /// included; nested messages and nested groups' inner fields are not.
    pub fn direct_field_numbers(&self) -> Vec<(i64, Range)> {
        let mut numbers: Vec<(i64, Range, Position)> = Vec::new();
        for f in &self.fields {
            numbers.push((f.number, f.number_range, f.range.start));
        }
        for m in &self.maps {
            numbers.push((m.number, m.number_range, m.range.start));
        }
        for o in &self.oneofs {
            for f in &o.fields {
                numbers.push((f.number, f.number_range, f.range.start));
            }
        }
        for g in &self.groups {
            numbers.push((g.number, g.number_range, g.range.start));
        }
        numbers.sort_by_key(|(_, _, start)| *start);
        numbers.into_iter().map(|(n, r, _)| (n, r)).collect()
    }

    pub fn reserved_contains(&self, n: i64) -> bool {
        self.reserved
            .iter()
            .flat_map(|r| &r.numbers)
            .any(|r| r.contains(n))
    }

    pub fn reserved_names(&self) -> impl Iterator<Item = &str> {
        self.reserved
            .iter()
            .flat_map(|r| &r.names)
            .map(|(name, _)| name.as_str())
    }

    pub fn extension_contains(&self, n: i64) -> bool {
        self.extensions
            .iter()
            .flat_map(|e| &e.ranges)
            .any(|r| r.contains(n))
    }

    pub fn nested_message(&self, name: &str) -> Option<&MessageDefinition> {
        self.nested_messages.iter().find(|m| m.name == name)
    }

    pub fn nested_enum(&self, name: &str) -> Option<&EnumDefinition> {
        self.nested_enums.iter().find(|e| e.name == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDefinition {
    pub name: String,
    pub number: i64,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub number_range: Range,
    pub comments: Comments,
}

impl EnumValueDefinition {
    pub fn is_deprecated(&self) -> bool {
        options_deprecate(&self.options)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDefinition {
    pub name: String,
    pub values: Vec<EnumValueDefinition>,
    pub options: Vec<OptionStatement>,
    pub reserved: Vec<ReservedStatement>,
    pub range: Range,
    pub name_range: Range,
    pub comments: Comments,
}

impl EnumDefinition {
    pub fn new(name: impl Into<String>) -> EnumDefinition {
        EnumDefinition {
            name: name.into(),
            values: Vec::new(),
            options: Vec::new(),
            reserved: Vec::new(),
            range: Range::default(),
            name_range: Range::default(),
            comments: Comments::default(),
        }
    }

    pub fn is_deprecated(&self) -> bool {
        options_deprecate(&self.options)
    }

    pub fn value(&self, name: &str) -> Option<&EnumValueDefinition> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn allows_alias(&self) -> bool {
        self.options
            .iter()
            .any(|o| o.name == "allow_alias" && o.value.as_bool() == Some(true))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcDefinition {
    pub name: String,
    pub input_type: String,
    pub output_type: String,
    pub input_stream: bool,
    pub output_stream: bool,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub input_type_range: Range,
    pub output_type_range: Range,
    pub comments: Comments,
}

impl RpcDefinition {
    pub fn is_deprecated(&self) -> bool {
        options_deprecate(&self.options)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDefinition {
    pub name: String,
    pub rpcs: Vec<RpcDefinition>,
    pub options: Vec<OptionStatement>,
    pub range: Range,
    pub name_range: Range,
    pub comments: Comments,
}

impl ServiceDefinition {
    pub fn is_deprecated(&self) -> bool {
        options_deprecate(&self.options)
    }
}

/// A proto2 `extend` block adding fields to a message declared elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendBlock {
    pub target: String,
    pub target_range: Range,
    pub fields: Vec<FieldDefinition>,
    pub groups: Vec<GroupDefinition>,
    pub range: Range,
    pub comments: Comments,
}

/// The parse result for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoFile {
    pub uri: String,
    pub syntax: Option<SyntaxDecl>,
    pub edition: Option<EditionDecl>,
    pub package: Option<PackageDecl>,
    pub imports: Vec<ImportStatement>,
    pub messages: Vec<MessageDefinition>,
    pub enums: Vec<EnumDefinition>,
    pub services: Vec<ServiceDefinition>,
    pub extends: Vec<ExtendBlock>,
    pub options: Vec<OptionStatement>,
    /// File-level comments that attached to no declaration.
    pub comments: Vec<Comment>,
    /// Syntax errors collected during parsing.
    pub notes: Vec<ParseNote>,
}

impl ProtoFile {
    pub fn empty(uri: impl Into<String>) -> ProtoFile {
        ProtoFile {
            uri: uri.into(),
            syntax: None,
            edition: None,
            package: None,
            imports: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            services: Vec::new(),
            extends: Vec::new(),
            options: Vec::new(),
            comments: Vec::new(),
            notes: Vec::new(),
        }
    }

    /// The declared package, or the empty string.
    pub fn package_name(&self) -> &str {
        self.package.as_ref().map(|p| p.name.as_str()).unwrap_or("")
    }

    /// The effective language level. An undeclared syntax means proto2, per
    /// the language definition.
    pub fn syntax_level(&self) -> SyntaxLevel {
        if self.edition.is_some() {
            return SyntaxLevel::Edition;
        }
        match self.syntax.as_ref().map(|s| s.version) {
            Some(SyntaxVersion::Proto3) => SyntaxLevel::Proto3,
            _ => SyntaxLevel::Proto2,
        }
    }
}

/// The built-in scalar types of the protobuf language.
pub const SCALAR_TYPES: &[&str] = &[
    "double", "float", "int32", "int64", "uint32", "uint64", "sint32", "sint64", "fixed32",
    "fixed64", "sfixed32", "sfixed64", "bool", "string", "bytes",
];

pub fn is_scalar_type(name: &str) -> bool {
    SCALAR_TYPES.contains(&name)
}

/// Map keys must be integral, bool or string: no floats, bytes or messages.
pub fn is_valid_map_key(name: &str) -> bool {
    is_scalar_type(name) && !matches!(name, "double" | "float" | "bytes")
}
