//! Resource values - WHAT a resource holds.
//!
//! `Value` is a closed tagged union. Every link stage pattern-matches the
//! known variants; introducing a new one is a deliberate change that has
//! to be audited across the merger, linker, flattener, and codecs.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::id::ResourceId;
use crate::core::name::{ResourceName, ResourceType};
use crate::io::file::InputFile;

/// Where a value came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Source {
    pub path: PathBuf,
    pub line: Option<usize>,
}

impl Source {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Source {
            path: path.into(),
            line: None,
        }
    }

    pub fn with_line(&self, line: usize) -> Self {
        Source {
            path: self.path.clone(),
            line: Some(line),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path.display(), line),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Declared visibility of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Visibility {
    #[default]
    Default,
    Private,
    Public,
}

/// Whether a reference was written `@type/name` or `?attr/name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceKind {
    #[default]
    Resource,
    Attribute,
}

/// A symbolic or resolved pointer at another resource.
///
/// Before linking only `name` is set; the reference linker fills in `id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reference {
    pub name: Option<ResourceName>,
    pub id: Option<ResourceId>,
    pub kind: ReferenceKind,
    /// Set when the reference was spelled `@*pkg:type/name`, granting
    /// access to private symbols.
    pub private_access: bool,
}

impl Reference {
    pub fn to_name(name: ResourceName) -> Self {
        Reference {
            name: Some(name),
            ..Reference::default()
        }
    }

    pub fn to_attr(name: ResourceName) -> Self {
        Reference {
            name: Some(name),
            kind: ReferenceKind::Attribute,
            ..Reference::default()
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sigil = match self.kind {
            ReferenceKind::Resource => '@',
            ReferenceKind::Attribute => '?',
        };
        match (&self.name, self.id) {
            (Some(name), _) => write!(f, "{}{}", sigil, name),
            (None, Some(id)) => write!(f, "{}{}", sigil, id),
            (None, None) => write!(f, "{}null", sigil),
        }
    }
}

/// Dimension units accepted in literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionUnit {
    Px,
    Dp,
    Sp,
    Pt,
    In,
    Mm,
}

impl DimensionUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DimensionUnit::Px => "px",
            DimensionUnit::Dp => "dp",
            DimensionUnit::Sp => "sp",
            DimensionUnit::Pt => "pt",
            DimensionUnit::In => "in",
            DimensionUnit::Mm => "mm",
        }
    }
}

/// A self-contained primitive literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Packed AARRGGBB.
    Color(u32),
    Dimension { value: f64, unit: DimensionUnit },
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Null => write!(f, "@null"),
            Primitive::Int(v) => write!(f, "{}", v),
            Primitive::Float(v) => write!(f, "{}", v),
            Primitive::Bool(v) => write!(f, "{}", v),
            Primitive::Color(v) => write!(f, "#{:08x}", v),
            Primitive::Dimension { value, unit } => write!(f, "{}{}", value, unit.as_str()),
        }
    }
}

/// A reference to a file in the output archive.
#[derive(Debug, Clone)]
pub struct FileReference {
    /// Destination path inside the archive (`res/layout/main.xml`).
    pub path: String,
    /// Handle to the payload backing this reference; set by the merger so
    /// the flattener can re-open the data.
    pub file: Option<Arc<InputFile>>,
}

impl PartialEq for FileReference {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

/// A value that may appear inside a compound value (style, array, plural).
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Reference(Reference),
    String(String),
    Primitive(Primitive),
    FileReference(FileReference),
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Reference(r) => match r.id {
                // Resolved references print their numeric form.
                Some(id) => write!(f, "@{}", id),
                None => write!(f, "{}", r),
            },
            Item::String(s) => f.write_str(s),
            Item::Primitive(p) => write!(f, "{}", p),
            Item::FileReference(fr) => f.write_str(&fr.path),
        }
    }
}

/// One `(attribute, value)` pair of a style.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleEntry {
    pub key: Reference,
    pub value: Item,
}

/// A style: optional parent plus attribute assignments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Style {
    pub parent: Option<Reference>,
    pub entries: Vec<StyleEntry>,
}

/// Plural quantity buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PluralForm {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

/// A quantity-keyed set of items.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plural {
    pub values: Vec<(PluralForm, Item)>,
}

/// Attribute format mask bits, matching the runtime's encoding.
pub mod format {
    pub const REFERENCE: u32 = 1 << 0;
    pub const STRING: u32 = 1 << 1;
    pub const INTEGER: u32 = 1 << 2;
    pub const BOOLEAN: u32 = 1 << 3;
    pub const COLOR: u32 = 1 << 4;
    pub const FLOAT: u32 = 1 << 5;
    pub const DIMENSION: u32 = 1 << 6;
    pub const FRACTION: u32 = 1 << 7;
    pub const ENUM: u32 = 1 << 16;
    pub const FLAGS: u32 = 1 << 17;
    pub const ANY: u32 = 0x0000_ffff;
}

/// An enum/flag symbol declared by an attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSymbol {
    pub symbol: Reference,
    pub value: u32,
}

/// An `<attr>` declaration with its format constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDecl {
    pub format: u32,
    pub symbols: Vec<AttributeSymbol>,
}

impl AttributeDecl {
    pub fn any() -> Self {
        AttributeDecl {
            format: format::ANY,
            symbols: Vec::new(),
        }
    }

    /// Whether `item` satisfies this attribute's format mask. References
    /// always pass since their target is checked separately.
    pub fn matches(&self, item: &Item) -> bool {
        let mask = self.format;
        if mask & format::ANY == format::ANY {
            return true;
        }
        match item {
            Item::Reference(_) | Item::FileReference(_) => mask & format::REFERENCE != 0,
            Item::String(s) => {
                if mask & format::STRING != 0 {
                    return true;
                }
                // Enum/flag symbol names arrive as plain strings.
                if mask & (format::ENUM | format::FLAGS) != 0 {
                    return s.split('|').all(|part| {
                        self.symbols.iter().any(|sym| {
                            sym.symbol
                                .name
                                .as_ref()
                                .is_some_and(|n| n.entry == part.trim())
                        })
                    });
                }
                false
            }
            Item::Primitive(p) => match p {
                Primitive::Null => true,
                Primitive::Int(_) => mask & (format::INTEGER | format::ENUM | format::FLAGS) != 0,
                Primitive::Float(_) => mask & format::FLOAT != 0,
                Primitive::Bool(_) => mask & format::BOOLEAN != 0,
                Primitive::Color(_) => mask & format::COLOR != 0,
                Primitive::Dimension { .. } => mask & format::DIMENSION != 0,
            },
        }
    }
}

/// The closed union of value payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Item(Item),
    /// Marker for a forward-declared `@+id/name`.
    Id,
    Style(Style),
    Array(Vec<Item>),
    Plural(Plural),
    Attribute(AttributeDecl),
}

/// A value plus the source it was defined at.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub source: Source,
    pub kind: ValueKind,
}

impl Value {
    pub fn new(source: Source, kind: ValueKind) -> Self {
        Value { source, kind }
    }

    pub fn item(source: Source, item: Item) -> Self {
        Value {
            source,
            kind: ValueKind::Item(item),
        }
    }

    /// The file reference inside this value, if it is one.
    pub fn as_file_reference(&self) -> Option<&FileReference> {
        match &self.kind {
            ValueKind::Item(Item::FileReference(fr)) => Some(fr),
            _ => None,
        }
    }

    pub fn as_file_reference_mut(&mut self) -> Option<&mut FileReference> {
        match &mut self.kind {
            ValueKind::Item(Item::FileReference(fr)) => Some(fr),
            _ => None,
        }
    }

    pub fn is_id_marker(&self) -> bool {
        matches!(self.kind, ValueKind::Id)
    }
}

/// Parse `@[+|*][pkg:]type/name`, `?[pkg:][attr/]name`, or `@null`.
///
/// Returns the reference and whether it was a `+` create spelling.
pub fn parse_reference(s: &str) -> Option<(Reference, bool)> {
    let s = s.trim();
    let (kind, rest) = match s.chars().next()? {
        '@' => (ReferenceKind::Resource, &s[1..]),
        '?' => (ReferenceKind::Attribute, &s[1..]),
        _ => return None,
    };

    if rest == "null" || rest == "empty" {
        return None;
    }

    let (create, rest) = match rest.strip_prefix('+') {
        Some(r) => (true, r),
        None => (false, rest),
    };
    let (private_access, rest) = match rest.strip_prefix('*') {
        Some(r) => (true, r),
        None => (false, rest),
    };

    let name = if kind == ReferenceKind::Attribute && !rest.contains('/') {
        // `?android:textColor` style shorthand.
        let (package, entry) = match rest.split_once(':') {
            Some((pkg, entry)) => (pkg, entry),
            None => ("", rest),
        };
        if entry.is_empty() {
            return None;
        }
        ResourceName::new(package, ResourceType::Attr, entry)
    } else {
        ResourceName::parse(rest).ok()?
    };

    Some((
        Reference {
            name: Some(name),
            id: None,
            kind,
            private_access,
        },
        create,
    ))
}

/// Parse a literal as the richest item it can be: reference, primitive,
/// or plain string.
pub fn parse_item(s: &str) -> Item {
    let trimmed = s.trim();
    if trimmed == "@null" {
        return Item::Primitive(Primitive::Null);
    }
    if let Some((reference, _)) = parse_reference(trimmed) {
        return Item::Reference(reference);
    }
    if let Some(color) = parse_color(trimmed) {
        return Item::Primitive(Primitive::Color(color));
    }
    if trimmed == "true" || trimmed == "false" {
        return Item::Primitive(Primitive::Bool(trimmed == "true"));
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Item::Primitive(Primitive::Int(int));
    }
    if let Some(dim) = parse_dimension(trimmed) {
        return Item::Primitive(dim);
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        return Item::Primitive(Primitive::Float(float));
    }
    Item::String(s.to_string())
}

fn parse_color(s: &str) -> Option<u32> {
    let hex = s.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let raw = u32::from_str_radix(hex, 16).ok()?;
    match hex.len() {
        // #rgb and #argb expand each nibble.
        3 => {
            let r = (raw >> 8) & 0xf;
            let g = (raw >> 4) & 0xf;
            let b = raw & 0xf;
            Some(0xff00_0000 | (r * 0x11) << 16 | (g * 0x11) << 8 | (b * 0x11))
        }
        4 => {
            let a = (raw >> 12) & 0xf;
            let r = (raw >> 8) & 0xf;
            let g = (raw >> 4) & 0xf;
            let b = raw & 0xf;
            Some((a * 0x11) << 24 | (r * 0x11) << 16 | (g * 0x11) << 8 | (b * 0x11))
        }
        6 => Some(0xff00_0000 | raw),
        8 => Some(raw),
        _ => None,
    }
}

fn parse_dimension(s: &str) -> Option<Primitive> {
    for unit in [
        DimensionUnit::Px,
        DimensionUnit::Dp,
        DimensionUnit::Sp,
        DimensionUnit::Pt,
        DimensionUnit::In,
        DimensionUnit::Mm,
    ] {
        if let Some(number) = s.strip_suffix(unit.as_str()) {
            if let Ok(value) = number.parse::<f64>() {
                return Some(Primitive::Dimension { value, unit });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_forms() {
        let (r, create) = parse_reference("@string/app_name").unwrap();
        assert!(!create);
        assert_eq!(r.kind, ReferenceKind::Resource);
        assert_eq!(r.name.unwrap().to_string(), "string/app_name");

        let (r, create) = parse_reference("@+id/button").unwrap();
        assert!(create);
        assert_eq!(r.name.unwrap().ty, ResourceType::Id);

        let (r, _) = parse_reference("?android:attr/textColor").unwrap();
        assert_eq!(r.kind, ReferenceKind::Attribute);

        let (r, _) = parse_reference("?android:textColor").unwrap();
        let name = r.name.unwrap();
        assert_eq!(name.ty, ResourceType::Attr);
        assert_eq!(name.package, "android");

        let (r, _) = parse_reference("@*com.x:string/secret").unwrap();
        assert!(r.private_access);

        assert!(parse_reference("plain text").is_none());
        assert!(parse_reference("@null").is_none());
    }

    #[test]
    fn test_parse_item_literals() {
        assert_eq!(parse_item("true"), Item::Primitive(Primitive::Bool(true)));
        assert_eq!(parse_item("42"), Item::Primitive(Primitive::Int(42)));
        assert_eq!(
            parse_item("#ff0000"),
            Item::Primitive(Primitive::Color(0xffff0000))
        );
        assert_eq!(
            parse_item("#f00"),
            Item::Primitive(Primitive::Color(0xffff0000))
        );
        assert_eq!(
            parse_item("12dp"),
            Item::Primitive(Primitive::Dimension {
                value: 12.0,
                unit: DimensionUnit::Dp
            })
        );
        assert_eq!(parse_item("@null"), Item::Primitive(Primitive::Null));
        assert_eq!(parse_item("hello"), Item::String("hello".into()));
    }

    #[test]
    fn test_attribute_format_matching() {
        let attr = AttributeDecl {
            format: format::COLOR | format::REFERENCE,
            symbols: Vec::new(),
        };
        assert!(attr.matches(&Item::Primitive(Primitive::Color(0xff000000))));
        assert!(attr.matches(&Item::Reference(Reference::default())));
        assert!(!attr.matches(&Item::Primitive(Primitive::Bool(true))));
        assert!(!attr.matches(&Item::String("red".into())));
    }

    #[test]
    fn test_enum_attribute_accepts_symbol_names() {
        let attr = AttributeDecl {
            format: format::ENUM,
            symbols: vec![AttributeSymbol {
                symbol: Reference::to_name(ResourceName::new("", ResourceType::Id, "vertical")),
                value: 1,
            }],
        };
        assert!(attr.matches(&Item::String("vertical".into())));
        assert!(!attr.matches(&Item::String("diagonal".into())));
    }
}
