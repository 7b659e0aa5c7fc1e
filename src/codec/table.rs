//! Serialized resource table codec (`.arsc.flat`).
//!
//! A single JSON document, no framing. Only the codec model here is
//! serde-coupled; the in-memory table stays plain. File handles inside
//! file references do not serialize; the merger re-binds them against
//! the collection the table was loaded from.

use serde::{Deserialize, Serialize};

use anyhow::{Context, Result};

use crate::core::config::ConfigDescription;
use crate::core::id::ResourceId;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::table::{ConfigValue, Entry, Package, ResourceTable, TypeGroup};
use crate::core::value::{
    AttributeDecl, AttributeSymbol, FileReference, Item, Plural, PluralForm, Reference,
    ReferenceKind, Source, Style, StyleEntry, Value, ValueKind, Visibility,
};
use crate::util::Diagnostics;

#[derive(Debug, Serialize, Deserialize)]
struct TableDoc {
    packages: Vec<PackageDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageDoc {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<u8>,
    types: Vec<TypeDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TypeDoc {
    ty: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<u8>,
    entries: Vec<EntryDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryDoc {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<u16>,
    #[serde(skip_serializing_if = "is_default_visibility", default)]
    visibility: VisibilityDoc,
    values: Vec<ConfigValueDoc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum VisibilityDoc {
    #[default]
    Default,
    Private,
    Public,
}

fn is_default_visibility(v: &VisibilityDoc) -> bool {
    *v == VisibilityDoc::Default
}

#[derive(Debug, Serialize, Deserialize)]
struct ConfigValueDoc {
    config: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    product: String,
    /// Original defining source, so relinked diagnostics still point at
    /// the file the author wrote.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    line: Option<usize>,
    value: ValueDoc,
}

#[derive(Debug, Serialize, Deserialize)]
enum ValueDoc {
    Item(ItemDoc),
    Id,
    Style {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        parent: Option<String>,
        entries: Vec<(String, ItemDoc)>,
    },
    Array(Vec<ItemDoc>),
    Plural(Vec<(String, ItemDoc)>),
    Attribute {
        format: u32,
        symbols: Vec<(String, u32)>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
enum ItemDoc {
    Reference {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<u32>,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        attribute: bool,
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        private: bool,
    },
    String(String),
    Primitive(String),
    File(String),
}

/// Serialize `table` to its on-disk form.
pub fn serialize_table(table: &ResourceTable) -> Result<Vec<u8>> {
    let doc = TableDoc {
        packages: table.packages.iter().map(package_to_doc).collect(),
    };
    serde_json::to_vec(&doc).context("failed to serialize resource table")
}

/// Parse a serialized table, reporting problems through `diag`.
pub fn deserialize_table(
    data: &[u8],
    source: &Source,
    diag: &Diagnostics,
) -> Option<ResourceTable> {
    let doc: TableDoc = match serde_json::from_slice(data) {
        Ok(doc) => doc,
        Err(err) => {
            diag.error_at(source, format!("invalid compiled table: {}", err));
            return None;
        }
    };

    let mut table = ResourceTable::new();
    for package_doc in doc.packages {
        match package_from_doc(package_doc, source) {
            Ok(package) => table.packages.push(package),
            Err(err) => {
                diag.error_at(source, format!("invalid compiled table: {}", err));
                return None;
            }
        }
    }
    Some(table)
}

fn package_to_doc(package: &Package) -> PackageDoc {
    PackageDoc {
        name: package.name.clone(),
        id: package.id,
        types: package
            .types
            .iter()
            .map(|group| TypeDoc {
                ty: group.ty.to_string(),
                id: group.id,
                entries: group.entries.iter().map(entry_to_doc).collect(),
            })
            .collect(),
    }
}

fn entry_to_doc(entry: &Entry) -> EntryDoc {
    EntryDoc {
        name: entry.name.clone(),
        id: entry.id,
        visibility: match entry.visibility {
            Visibility::Default => VisibilityDoc::Default,
            Visibility::Private => VisibilityDoc::Private,
            Visibility::Public => VisibilityDoc::Public,
        },
        values: entry
            .values
            .iter()
            .map(|cv| ConfigValueDoc {
                config: cv.config.to_string(),
                product: cv.product.clone(),
                source: Some(cv.value.source.path.to_string_lossy().into_owned()),
                line: cv.value.source.line,
                value: value_to_doc(&cv.value.kind),
            })
            .collect(),
    }
}

fn value_to_doc(kind: &ValueKind) -> ValueDoc {
    match kind {
        ValueKind::Item(item) => ValueDoc::Item(item_to_doc(item)),
        ValueKind::Id => ValueDoc::Id,
        ValueKind::Style(style) => ValueDoc::Style {
            parent: style.parent.as_ref().map(reference_spelling),
            entries: style
                .entries
                .iter()
                .map(|e| (reference_spelling(&e.key), item_to_doc(&e.value)))
                .collect(),
        },
        ValueKind::Array(items) => ValueDoc::Array(items.iter().map(item_to_doc).collect()),
        ValueKind::Plural(plural) => ValueDoc::Plural(
            plural
                .values
                .iter()
                .map(|(form, item)| (plural_form_name(*form).to_string(), item_to_doc(item)))
                .collect(),
        ),
        ValueKind::Attribute(attr) => ValueDoc::Attribute {
            format: attr.format,
            symbols: attr
                .symbols
                .iter()
                .map(|s| (reference_spelling(&s.symbol), s.value))
                .collect(),
        },
    }
}

fn item_to_doc(item: &Item) -> ItemDoc {
    match item {
        Item::Reference(r) => ItemDoc::Reference {
            name: r.name.as_ref().map(|n| n.to_string()),
            id: r.id.map(|id| id.0),
            attribute: r.kind == ReferenceKind::Attribute,
            private: r.private_access,
        },
        Item::String(s) => ItemDoc::String(s.clone()),
        Item::Primitive(p) => ItemDoc::Primitive(p.to_string()),
        Item::FileReference(fr) => ItemDoc::File(fr.path.clone()),
    }
}

fn reference_spelling(r: &Reference) -> String {
    match &r.name {
        Some(name) => name.to_string(),
        None => r
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "null".to_string()),
    }
}

fn plural_form_name(form: PluralForm) -> &'static str {
    match form {
        PluralForm::Zero => "zero",
        PluralForm::One => "one",
        PluralForm::Two => "two",
        PluralForm::Few => "few",
        PluralForm::Many => "many",
        PluralForm::Other => "other",
    }
}

fn plural_form_from_name(name: &str) -> Result<PluralForm> {
    Ok(match name {
        "zero" => PluralForm::Zero,
        "one" => PluralForm::One,
        "two" => PluralForm::Two,
        "few" => PluralForm::Few,
        "many" => PluralForm::Many,
        "other" => PluralForm::Other,
        other => anyhow::bail!("unknown plural form `{}`", other),
    })
}

fn package_from_doc(doc: PackageDoc, source: &Source) -> Result<Package> {
    let mut package = Package::new(doc.name);
    package.id = doc.id;
    for type_doc in doc.types {
        let ty: ResourceType = type_doc
            .ty
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut group = TypeGroup::new(ty);
        group.id = type_doc.id;
        for entry_doc in type_doc.entries {
            group.entries.push(entry_from_doc(entry_doc, source)?);
        }
        package.types.push(group);
    }
    Ok(package)
}

fn entry_from_doc(doc: EntryDoc, source: &Source) -> Result<Entry> {
    let mut entry = Entry::new(doc.name);
    entry.id = doc.id;
    entry.visibility = match doc.visibility {
        VisibilityDoc::Default => Visibility::Default,
        VisibilityDoc::Private => Visibility::Private,
        VisibilityDoc::Public => Visibility::Public,
    };
    if entry.visibility != Visibility::Default {
        entry.visibility_source = Some(source.clone());
    }

    for cv in doc.values {
        let config = ConfigDescription::parse(&cv.config)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let base_source = match cv.source {
            Some(path) => Source::new(path),
            None => source.clone(),
        };
        let value_source = match cv.line {
            Some(line) => base_source.with_line(line),
            None => base_source,
        };
        entry.values.push(ConfigValue {
            config,
            product: cv.product,
            value: Value::new(value_source, value_from_doc(cv.value)?),
        });
    }
    Ok(entry)
}

fn value_from_doc(doc: ValueDoc) -> Result<ValueKind> {
    Ok(match doc {
        ValueDoc::Item(item) => ValueKind::Item(item_from_doc(item)?),
        ValueDoc::Id => ValueKind::Id,
        ValueDoc::Style { parent, entries } => {
            let parent = parent.map(|p| reference_from_spelling(&p)).transpose()?;
            let mut style = Style {
                parent,
                entries: Vec::with_capacity(entries.len()),
            };
            for (key, value) in entries {
                style.entries.push(StyleEntry {
                    key: attr_reference_from_spelling(&key)?,
                    value: item_from_doc(value)?,
                });
            }
            ValueKind::Style(style)
        }
        ValueDoc::Array(items) => ValueKind::Array(
            items
                .into_iter()
                .map(item_from_doc)
                .collect::<Result<_>>()?,
        ),
        ValueDoc::Plural(values) => {
            let mut plural = Plural::default();
            for (form, item) in values {
                plural
                    .values
                    .push((plural_form_from_name(&form)?, item_from_doc(item)?));
            }
            ValueKind::Plural(plural)
        }
        ValueDoc::Attribute { format, symbols } => {
            let mut attr = AttributeDecl {
                format,
                symbols: Vec::with_capacity(symbols.len()),
            };
            for (symbol, value) in symbols {
                attr.symbols.push(AttributeSymbol {
                    symbol: reference_from_spelling(&symbol)?,
                    value,
                });
            }
            ValueKind::Attribute(attr)
        }
    })
}

fn item_from_doc(doc: ItemDoc) -> Result<Item> {
    Ok(match doc {
        ItemDoc::Reference {
            name,
            id,
            attribute,
            private,
        } => {
            let name = name.map(|n| ResourceName::parse(&n)).transpose()?;
            Item::Reference(Reference {
                name,
                id: id.map(ResourceId),
                kind: if attribute {
                    ReferenceKind::Attribute
                } else {
                    ReferenceKind::Resource
                },
                private_access: private,
            })
        }
        ItemDoc::String(s) => Item::String(s),
        ItemDoc::Primitive(p) => match crate::core::value::parse_item(&p) {
            Item::Primitive(prim) => Item::Primitive(prim),
            _ => anyhow::bail!("invalid primitive literal `{}`", p),
        },
        ItemDoc::File(path) => Item::FileReference(FileReference { path, file: None }),
    })
}

fn reference_from_spelling(s: &str) -> Result<Reference> {
    Ok(Reference::to_name(ResourceName::parse(s)?))
}

fn attr_reference_from_spelling(s: &str) -> Result<Reference> {
    Ok(Reference::to_attr(ResourceName::parse(s)?))
}
