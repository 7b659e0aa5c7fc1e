//! Reference resolution.
//!
//! Two passes share the resolution rules: the value linker walks every
//! value in the final table, the XML linker walks one document. Both
//! accumulate diagnostics and only report failure at the end, so a
//! single run surfaces every unresolved reference.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::codec::xml::{self, Element, XmlResource};
use crate::core::id::ResourceId;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::table::ResourceTable;
use crate::core::value::{
    self, AttributeDecl, Item, Primitive, Reference, ReferenceKind, Source, ValueKind,
};
use crate::link::symbols::{symbol_from_table_entry, Symbol};
use crate::link::LinkContext;

/// Last framework `attr` entry ID introduced by each SDK level.
///
/// Mirrors the platform's table; attributes with entry IDs past the
/// last row are treated as current.
const ATTR_MAX_ENTRY_PER_SDK: &[(u16, u16)] = &[
    (0x021c, 1),
    (0x021d, 2),
    (0x0269, 3),
    (0x028d, 4),
    (0x02ad, 5),
    (0x02b3, 6),
    (0x02b5, 7),
    (0x02bd, 8),
    (0x02cb, 9),
    (0x0361, 11),
    (0x0366, 12),
    (0x03a6, 13),
    (0x03ae, 16),
    (0x03cc, 17),
    (0x03da, 18),
    (0x03f1, 19),
    (0x03f6, 20),
    (0x04ce, 21),
    (0x04d8, 22),
    (0x04f1, 23),
];

/// SDK level at which a framework attribute was introduced; 0 for
/// non-framework attributes.
pub fn attribute_sdk_level(id: ResourceId) -> u16 {
    if id.package_id() != 0x01 || id.type_id() != 0x01 {
        return 0;
    }
    let entry = id.entry_id();
    for (max_entry, sdk) in ATTR_MAX_ENTRY_PER_SDK {
        if entry <= *max_entry {
            return *sdk;
        }
    }
    ATTR_MAX_ENTRY_PER_SDK.last().map(|(_, sdk)| *sdk + 1).unwrap_or(0)
}

/// Outcome of resolving one reference.
enum Resolution {
    Resolved(Symbol),
    /// Symbol exists but may not be referenced from here.
    Denied,
    Missing,
}

/// Resolve `reference` against the final table, then the external
/// symbol chain, applying name mangling for merged library packages.
fn resolve(reference: &Reference, table: &ResourceTable, ctx: &LinkContext) -> Resolution {
    let Some(name) = &reference.name else {
        // Already-numeric references pass through untouched.
        return match reference.id {
            Some(_) => Resolution::Resolved(Symbol::default()),
            None => Resolution::Missing,
        };
    };

    let mut lookup = name.clone();
    if !lookup.has_package() {
        lookup.package = ctx.compilation_package.clone();
    }
    if let Some(mangled) = ctx.mangler.mangle_name(&lookup) {
        lookup = mangled;
    }

    let symbol = symbol_from_table_entry(table, &lookup, false)
        .map(|mut s| {
            // Entries of the compilation package are always visible to it.
            if lookup.package == ctx.compilation_package {
                s.is_public = true;
            }
            s
        })
        .or_else(|| ctx.symbols.find_by_name(&lookup).map(|s: Rc<Symbol>| (*s).clone()));

    match symbol {
        Some(symbol) => {
            if symbol.is_public
                || reference.private_access
                || lookup.package == ctx.compilation_package
            {
                Resolution::Resolved(symbol)
            } else {
                Resolution::Denied
            }
        }
        None => Resolution::Missing,
    }
}

fn effective_name(reference: &Reference) -> String {
    reference
        .name
        .as_ref()
        .map(|n| n.to_string())
        .unwrap_or_else(|| {
            reference
                .id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "@null".to_string())
        })
}

/// Whether an unresolved reference is fatal or collapses to `@null`.
fn points_at_compilation_package(reference: &Reference, ctx: &LinkContext) -> bool {
    match &reference.name {
        Some(name) => !name.has_package() || name.package == ctx.compilation_package,
        None => true,
    }
}

struct ValueLinker<'a> {
    table: &'a ResourceTable,
    ctx: &'a LinkContext,
    errors: usize,
}

impl ValueLinker<'_> {
    /// Resolve in place; may replace the item with `@null` for lenient
    /// cross-package misses.
    fn link_item(&mut self, item: &mut Item, source: &Source) {
        let Item::Reference(reference) = item else {
            return;
        };
        if self.link_reference(reference, source) == LinkOutcome::Null {
            *item = Item::Primitive(Primitive::Null);
        }
    }

    /// Reports and counts failures itself; callers only act on `Null`.
    fn link_reference(&mut self, reference: &mut Reference, source: &Source) -> LinkOutcome {
        match resolve(reference, self.table, self.ctx) {
            Resolution::Resolved(symbol) => {
                if let Some(mangled) = reference
                    .name
                    .as_ref()
                    .and_then(|n| self.ctx.mangler.mangle_name(n))
                {
                    reference.name = Some(mangled);
                }
                if let Some(id) = symbol.id {
                    reference.id = Some(id);
                }
                LinkOutcome::Ok
            }
            Resolution::Denied => {
                self.ctx.diag.error_at(
                    source,
                    format!("resource {} is private", effective_name(reference)),
                );
                self.errors += 1;
                LinkOutcome::Error
            }
            Resolution::Missing => {
                if points_at_compilation_package(reference, self.ctx) {
                    self.ctx.diag.error_at(
                        source,
                        format!("resource {} not found", effective_name(reference)),
                    );
                    self.errors += 1;
                    LinkOutcome::Error
                } else {
                    self.ctx.diag.warn_at(
                        source,
                        format!(
                            "resource {} not found, replacing with @null",
                            effective_name(reference)
                        ),
                    );
                    LinkOutcome::Null
                }
            }
        }
    }

    fn link_value(&mut self, kind: &mut ValueKind, source: &Source) {
        match kind {
            ValueKind::Item(item) => self.link_item(item, source),
            ValueKind::Id => {}
            ValueKind::Style(style) => {
                if let Some(parent) = &mut style.parent {
                    if self.link_reference(parent, source) == LinkOutcome::Null {
                        style.parent = None;
                    }
                }
                for entry in &mut style.entries {
                    let attribute = match resolve(&entry.key, self.table, self.ctx) {
                        Resolution::Resolved(symbol) => {
                            if let Some(mangled) = entry
                                .key
                                .name
                                .as_ref()
                                .and_then(|n| self.ctx.mangler.mangle_name(n))
                            {
                                entry.key.name = Some(mangled);
                            }
                            if let Some(id) = symbol.id {
                                entry.key.id = Some(id);
                            }
                            symbol.attribute
                        }
                        Resolution::Denied => {
                            self.ctx.diag.error_at(
                                source,
                                format!("attribute {} is private", effective_name(&entry.key)),
                            );
                            self.errors += 1;
                            None
                        }
                        Resolution::Missing => {
                            self.ctx.diag.error_at(
                                source,
                                format!("attribute {} not found", effective_name(&entry.key)),
                            );
                            self.errors += 1;
                            None
                        }
                    };

                    self.link_item(&mut entry.value, source);
                    if let Some(attribute) = attribute {
                        check_attribute_format(
                            &attribute,
                            &entry.key,
                            &entry.value,
                            source,
                            self.ctx,
                            &mut self.errors,
                        );
                    }
                }
            }
            ValueKind::Array(items) => {
                for item in items {
                    self.link_item(item, source);
                }
            }
            ValueKind::Plural(plural) => {
                for (_, item) in &mut plural.values {
                    self.link_item(item, source);
                }
            }
            ValueKind::Attribute(attr) => {
                for symbol in &mut attr.symbols {
                    self.link_reference(&mut symbol.symbol, source);
                }
            }
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum LinkOutcome {
    Ok,
    Null,
    Error,
}

fn check_attribute_format(
    attribute: &AttributeDecl,
    key: &Reference,
    item: &Item,
    source: &Source,
    ctx: &LinkContext,
    errors: &mut usize,
) {
    if !attribute.matches(item) {
        ctx.diag.error_at(
            source,
            format!(
                "value {} does not match format of attribute {}",
                item,
                effective_name(key)
            ),
        );
        *errors += 1;
    }
}

/// Resolve every reference in the final table.
///
/// The table is cloned for lookups so that values can be rewritten in
/// place while resolution still sees the pre-link state.
pub fn link_table_references(table: &mut ResourceTable, ctx: &LinkContext) -> bool {
    let lookup = table.clone();
    let mut linker = ValueLinker {
        table: &lookup,
        ctx,
        errors: 0,
    };

    for package in &mut table.packages {
        for group in &mut package.types {
            for entry in &mut group.entries {
                for cv in &mut entry.values {
                    let source = cv.value.source.clone();
                    linker.link_value(&mut cv.value.kind, &source);
                }
            }
        }
    }
    linker.errors == 0
}

/// Result of linking one XML document.
#[derive(Debug, Default)]
pub struct XmlLinkResult {
    /// SDK levels of all framework attributes that resolved.
    pub sdk_levels: BTreeSet<u16>,
    pub success: bool,
}

/// Resolve references inside one XML document: attribute names are
/// checked against their declarations, literal values are format
/// checked and compiled, and the SDK level of every framework attribute
/// is recorded for auto-versioning.
pub fn link_xml_references(
    doc: &mut XmlResource,
    table: &ResourceTable,
    ctx: &LinkContext,
) -> XmlLinkResult {
    let mut result = XmlLinkResult {
        sdk_levels: BTreeSet::new(),
        success: true,
    };
    let source = doc.source.clone();
    link_element(&mut doc.root, table, ctx, &source, &mut result);
    result
}

fn link_element(
    element: &mut Element,
    table: &ResourceTable,
    ctx: &LinkContext,
    source: &Source,
    result: &mut XmlLinkResult,
) {
    let line_source = source.with_line(element.line);

    for attr in &mut element.attributes {
        // Attributes in a resource namespace must be declared.
        if let Some((package, private)) = xml::package_for_namespace(&attr.namespace_uri) {
            let attr_name = ResourceName::new(
                if package.is_empty() {
                    ctx.compilation_package.clone()
                } else {
                    package
                },
                ResourceType::Attr,
                attr.name.clone(),
            );
            let mut key = Reference::to_attr(attr_name);
            key.private_access = private;

            match resolve(&key, table, ctx) {
                Resolution::Resolved(symbol) => {
                    if let Some(id) = symbol.id {
                        let sdk_level = attribute_sdk_level(id);
                        attr.sdk_level = sdk_level;
                        if sdk_level > 1 {
                            result.sdk_levels.insert(sdk_level);
                        }
                    }
                    if let Some(attribute) = &symbol.attribute {
                        link_attribute_value(attr, attribute, &key, table, ctx, &line_source, result);
                    } else {
                        compile_attribute_value(attr, table, ctx, &line_source, result);
                    }
                }
                Resolution::Denied => {
                    ctx.diag.error_at(
                        &line_source,
                        format!("attribute {} is private", effective_name(&key)),
                    );
                    result.success = false;
                }
                Resolution::Missing => {
                    // Undeclared attributes of the compilation package
                    // are authoring mistakes; framework attributes may
                    // simply lack an include to declare them.
                    if points_at_compilation_package(&key, ctx) {
                        ctx.diag.error_at(
                            &line_source,
                            format!("attribute {} not found", effective_name(&key)),
                        );
                        result.success = false;
                    } else {
                        ctx.diag.warn_at(
                            &line_source,
                            format!("attribute {} not found", effective_name(&key)),
                        );
                        compile_attribute_value(attr, table, ctx, &line_source, result);
                    }
                }
            }
        } else {
            compile_attribute_value(attr, table, ctx, &line_source, result);
        }
    }

    for child in element.child_elements_mut() {
        link_element(child, table, ctx, source, result);
    }
}

fn link_attribute_value(
    attr: &mut xml::Attribute,
    attribute: &AttributeDecl,
    key: &Reference,
    table: &ResourceTable,
    ctx: &LinkContext,
    line_source: &Source,
    result: &mut XmlLinkResult,
) {
    compile_attribute_value(attr, table, ctx, line_source, result);

    let item = attr
        .compiled_value
        .clone()
        .unwrap_or_else(|| Item::String(attr.value.clone()));
    if !attribute.matches(&item) {
        ctx.diag.error_at(
            line_source,
            format!(
                "value \"{}\" does not match format of attribute {}",
                attr.value,
                effective_name(key)
            ),
        );
        result.success = false;
    }
}

fn compile_attribute_value(
    attr: &mut xml::Attribute,
    table: &ResourceTable,
    ctx: &LinkContext,
    line_source: &Source,
    result: &mut XmlLinkResult,
) {
    let item = value::parse_item(&attr.value);
    match item {
        Item::Reference(mut reference) => {
            match resolve(&reference, table, ctx) {
                Resolution::Resolved(symbol) => {
                    if let Some(mangled) = reference
                        .name
                        .as_ref()
                        .and_then(|n| ctx.mangler.mangle_name(n))
                    {
                        reference.name = Some(mangled);
                    }
                    if let Some(id) = symbol.id {
                        reference.id = Some(id);
                    }
                    if reference.kind == ReferenceKind::Attribute {
                        if let Some(id) = symbol.id {
                            let sdk_level = attribute_sdk_level(id);
                            if sdk_level > 1 {
                                result.sdk_levels.insert(sdk_level);
                            }
                        }
                    }
                    attr.compiled_value = Some(Item::Reference(reference));
                }
                Resolution::Denied => {
                    ctx.diag.error_at(
                        line_source,
                        format!("resource {} is private", effective_name(&reference)),
                    );
                    result.success = false;
                }
                Resolution::Missing => {
                    if points_at_compilation_package(&reference, ctx) {
                        ctx.diag.error_at(
                            line_source,
                            format!("resource {} not found", effective_name(&reference)),
                        );
                        result.success = false;
                    } else {
                        ctx.diag.warn_at(
                            line_source,
                            format!("resource {} not found", effective_name(&reference)),
                        );
                    }
                }
            }
        }
        Item::Primitive(primitive) => {
            attr.compiled_value = Some(Item::Primitive(primitive));
        }
        // Plain strings stay raw.
        _ => {}
    }
}
