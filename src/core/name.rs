//! Resource naming - WHAT a resource is called.
//!
//! A `ResourceName` is the (package, type, entry) triple that identifies a
//! resource symbolically, before any numeric ID is assigned. The textual
//! grammar is `[package:]type/entry`, e.g. `android:attr/text` or
//! `string/app_name`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The set of resource types understood by the linker.
///
/// This is a closed enum: every stage pattern-matches it, and adding a
/// variant is a deliberate change that must be threaded through the type
/// ordering used during ID assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceType {
    Anim,
    Animator,
    Array,
    Attr,
    /// Attributes moved out of the public `attr` space before ID assignment.
    AttrPrivate,
    Bool,
    Color,
    Dimen,
    Drawable,
    Id,
    Integer,
    Interpolator,
    Layout,
    Menu,
    Mipmap,
    Plurals,
    Raw,
    String,
    Style,
    Styleable,
    Transition,
    Xml,
}

impl ResourceType {
    /// All types, in the canonical order used for ID assignment tie-breaks.
    pub fn all() -> &'static [ResourceType] {
        use ResourceType::*;
        &[
            Anim, Animator, Array, Attr, AttrPrivate, Bool, Color, Dimen, Drawable, Id, Integer,
            Interpolator, Layout, Menu, Mipmap, Plurals, Raw, String, Style, Styleable, Transition,
            Xml,
        ]
    }

    /// The qualifier used in resource paths and names (`res/<name>-config/`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Anim => "anim",
            ResourceType::Animator => "animator",
            ResourceType::Array => "array",
            ResourceType::Attr => "attr",
            ResourceType::AttrPrivate => "^attr-private",
            ResourceType::Bool => "bool",
            ResourceType::Color => "color",
            ResourceType::Dimen => "dimen",
            ResourceType::Drawable => "drawable",
            ResourceType::Id => "id",
            ResourceType::Integer => "integer",
            ResourceType::Interpolator => "interpolator",
            ResourceType::Layout => "layout",
            ResourceType::Menu => "menu",
            ResourceType::Mipmap => "mipmap",
            ResourceType::Plurals => "plurals",
            ResourceType::Raw => "raw",
            ResourceType::String => "string",
            ResourceType::Style => "style",
            ResourceType::Styleable => "styleable",
            ResourceType::Transition => "transition",
            ResourceType::Xml => "xml",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a resource type or name from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("unknown resource type `{0}`")]
    UnknownType(String),

    #[error("invalid resource name `{0}`, expected [package:]type/entry")]
    InvalidName(String),
}

impl FromStr for ResourceType {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, NameError> {
        ResourceType::all()
            .iter()
            .find(|ty| ty.as_str() == s)
            .copied()
            .ok_or_else(|| NameError::UnknownType(s.to_string()))
    }
}

/// The symbolic identity of a resource.
///
/// An empty `package` means "the current compilation package"; it is
/// filled in before the name participates in any lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceName {
    pub package: String,
    pub ty: ResourceType,
    pub entry: String,
}

impl ResourceName {
    /// Create a name from its parts.
    pub fn new(package: impl Into<String>, ty: ResourceType, entry: impl Into<String>) -> Self {
        ResourceName {
            package: package.into(),
            ty,
            entry: entry.into(),
        }
    }

    /// Parse `[package:]type/entry`.
    pub fn parse(s: &str) -> Result<Self, NameError> {
        let (package, rest) = match s.split_once(':') {
            Some((pkg, rest)) => (pkg, rest),
            None => ("", s),
        };

        let (ty, entry) = rest
            .split_once('/')
            .ok_or_else(|| NameError::InvalidName(s.to_string()))?;

        if entry.is_empty() {
            return Err(NameError::InvalidName(s.to_string()));
        }

        Ok(ResourceName {
            package: package.to_string(),
            ty: ty.parse()?,
            entry: entry.to_string(),
        })
    }

    /// Whether the package component is set.
    pub fn has_package(&self) -> bool {
        !self.package.is_empty()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_package() {
            write!(f, "{}:{}/{}", self.package, self.ty, self.entry)
        } else {
            write!(f, "{}/{}", self.ty, self.entry)
        }
    }
}
