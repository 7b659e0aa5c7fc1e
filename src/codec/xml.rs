//! XML documents: inflate, model, flatten.
//!
//! The linker processes XML as a small DOM. Namespace prefixes are
//! resolved to URIs at inflate time; elements remember their own
//! `xmlns` declarations so the flattener can re-emit them. Attribute
//! values may carry a compiled form (a resolved reference or primitive)
//! that the flattener prefers over the raw text.

use std::io::Cursor;

use anyhow::{Context, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::core::config::ConfigDescription;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::value::{Item, Source};
use crate::util::Diagnostics;

/// The framework resource namespace.
pub const SCHEMA_ANDROID: &str = "http://schemas.android.com/apk/res/android";
/// The "current package" resource namespace.
pub const SCHEMA_RES_AUTO: &str = "http://schemas.android.com/apk/res-auto";
/// Per-package resource namespace prefix.
pub const SCHEMA_PREFIX: &str = "http://schemas.android.com/apk/res/";
/// Per-package private resource namespace prefix.
pub const SCHEMA_PRIVATE_PREFIX: &str = "http://schemas.android.com/apk/prv/res/";

/// Map a namespace URI to the resource package it addresses.
///
/// Returns `(package, private_access)`; an empty package means the
/// current compilation package.
pub fn package_for_namespace(uri: &str) -> Option<(String, bool)> {
    if uri == SCHEMA_RES_AUTO {
        return Some((String::new(), false));
    }
    if let Some(package) = uri.strip_prefix(SCHEMA_PREFIX) {
        return Some((package.to_string(), false));
    }
    if let Some(package) = uri.strip_prefix(SCHEMA_PRIVATE_PREFIX) {
        return Some((package.to_string(), true));
    }
    None
}

/// An XML attribute with its resolved namespace.
#[derive(Debug, Clone, Default)]
pub struct Attribute {
    pub namespace_uri: String,
    pub name: String,
    pub value: String,
    /// Filled by the XML reference linker: the value with references
    /// resolved to IDs.
    pub compiled_value: Option<Item>,
    /// SDK level at which this (framework) attribute was introduced.
    pub sdk_level: u16,
}

/// Node in the document tree.
#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub namespace_uri: String,
    pub name: String,
    /// `xmlns` declarations made on this element, as (prefix, uri).
    pub namespace_decls: Vec<(String, String)>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
    pub line: usize,
}

impl Element {
    pub fn find_attribute(&self, namespace_uri: &str, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.namespace_uri == namespace_uri && a.name == name)
    }

    pub fn find_child(&self, namespace_uri: &str, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|node| match node {
            Node::Element(el) if el.namespace_uri == namespace_uri && el.name == name => Some(el),
            _ => None,
        })
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }
}

/// A parsed XML file plus the resource it defines.
#[derive(Debug, Clone)]
pub struct XmlResource {
    /// Resource this document defines; empty entry for the manifest.
    pub name: ResourceName,
    pub config: ConfigDescription,
    pub source: Source,
    pub root: Element,
}

impl XmlResource {
    pub fn new(source: Source, root: Element) -> Self {
        XmlResource {
            name: ResourceName::new("", ResourceType::Xml, "document"),
            config: ConfigDescription::default(),
            source,
            root,
        }
    }
}

fn line_of(data: &[u8], pos: usize) -> usize {
    data[..pos.min(data.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// The reader position before an element event may still sit on
/// trailing whitespace of the previous node; anchor on the tag itself.
fn tag_pos(data: &[u8], pos: usize) -> usize {
    data[pos.min(data.len())..]
        .iter()
        .position(|&b| b == b'<')
        .map(|offset| pos + offset)
        .unwrap_or(pos)
}

struct NamespaceScope {
    // (prefix, uri), innermost last
    bindings: Vec<(String, String)>,
}

impl NamespaceScope {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

/// Inflate a text XML document into the DOM.
pub fn inflate(data: &[u8], source: &Source, diag: &Diagnostics) -> Option<XmlResource> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut scope = NamespaceScope {
        bindings: vec![("xml".to_string(), "http://www.w3.org/XML/1998/namespace".to_string())],
    };
    // Stack of (element, namespace count to pop on close).
    let mut stack: Vec<(Element, usize)> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event_into(&mut buf) {
            Err(err) => {
                let line_source = source.with_line(line_of(data, pos));
                diag.error_at(&line_source, format!("malformed XML: {}", err));
                return None;
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let opened =
                    match open_element(&start, &mut scope, source, data, tag_pos(data, pos), diag)
                    {
                        Some(opened) => opened,
                        None => return None,
                    };
                stack.push(opened);
            }
            Ok(Event::Empty(start)) => {
                let (element, decls) =
                    match open_element(&start, &mut scope, source, data, tag_pos(data, pos), diag)
                    {
                        Some(opened) => opened,
                        None => return None,
                    };
                scope.bindings.truncate(scope.bindings.len() - decls);
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(_)) => {
                let (element, decls) = match stack.pop() {
                    Some(top) => top,
                    None => {
                        diag.error_at(source, "malformed XML: unbalanced end tag");
                        return None;
                    }
                };
                scope.bindings.truncate(scope.bindings.len() - decls);
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(text)) => {
                if let Some((parent, _)) = stack.last_mut() {
                    match text.unescape() {
                        Ok(unescaped) => {
                            if !unescaped.trim().is_empty() {
                                parent.children.push(Node::Text(unescaped.into_owned()));
                            }
                        }
                        Err(err) => {
                            let line_source = source.with_line(line_of(data, pos));
                            diag.error_at(&line_source, format!("malformed XML text: {}", err));
                            return None;
                        }
                    }
                }
            }
            // Declarations, comments, CDATA, processing instructions.
            Ok(_) => {}
        }
        buf.clear();
    }

    match root {
        Some(root) => Some(XmlResource::new(source.clone(), root)),
        None => {
            diag.error_at(source, "malformed XML: no root element");
            None
        }
    }
}

fn attach(stack: &mut [(Element, usize)], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some((parent, _)) => parent.children.push(Node::Element(element)),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn open_element(
    start: &BytesStart<'_>,
    scope: &mut NamespaceScope,
    source: &Source,
    data: &[u8],
    pos: usize,
    diag: &Diagnostics,
) -> Option<(Element, usize)> {
    let line = line_of(data, pos);
    let line_source = source.with_line(line);

    // First pass: namespace declarations come into scope before any
    // name on this element resolves.
    let mut decls = 0;
    let mut plain_attrs = Vec::new();
    for attr in start.attributes() {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                diag.error_at(&line_source, format!("malformed XML attribute: {}", err));
                return None;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(err) => {
                diag.error_at(&line_source, format!("malformed XML attribute: {}", err));
                return None;
            }
        };

        if key == "xmlns" {
            scope.bindings.push((String::new(), value.clone()));
            decls += 1;
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            scope.bindings.push((prefix.to_string(), value.clone()));
            decls += 1;
        } else {
            plain_attrs.push((key, value));
        }
    }

    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (namespace_uri, name) = match resolve_name(&raw_name, scope, true) {
        Some(resolved) => resolved,
        None => {
            diag.error_at(
                &line_source,
                format!("unknown namespace prefix in `{}`", raw_name),
            );
            return None;
        }
    };

    let mut element = Element {
        namespace_uri,
        name,
        namespace_decls: scope.bindings[scope.bindings.len() - decls..].to_vec(),
        attributes: Vec::with_capacity(plain_attrs.len()),
        children: Vec::new(),
        line,
    };

    for (key, value) in plain_attrs {
        let (namespace_uri, name) = match resolve_name(&key, scope, false) {
            Some(resolved) => resolved,
            None => {
                diag.error_at(
                    &line_source,
                    format!("unknown namespace prefix in attribute `{}`", key),
                );
                return None;
            }
        };
        element.attributes.push(Attribute {
            namespace_uri,
            name,
            value,
            compiled_value: None,
            sdk_level: 0,
        });
    }

    Some((element, decls))
}

fn resolve_name(
    raw: &str,
    scope: &NamespaceScope,
    use_default_namespace: bool,
) -> Option<(String, String)> {
    match raw.split_once(':') {
        Some((prefix, local)) => scope
            .resolve(prefix)
            .map(|uri| (uri.to_string(), local.to_string())),
        None => {
            // Unprefixed attributes never take the default namespace.
            let uri = if use_default_namespace {
                scope.resolve("").unwrap_or("")
            } else {
                ""
            };
            Some((uri.to_string(), raw.to_string()))
        }
    }
}

/// Options for [`flatten`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FlattenOptions {
    /// Emit raw attribute text even when a compiled value exists.
    pub keep_raw_values: bool,
    /// Drop framework attributes introduced after this SDK level; a
    /// versioned sibling carries them instead.
    pub max_sdk_level: Option<u16>,
}

/// Flatten the document back to bytes.
pub fn flatten(doc: &XmlResource, options: &FlattenOptions) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_element(&mut writer, &doc.root, options, &mut Vec::new())?;
    Ok(writer.into_inner().into_inner())
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    element: &Element,
    options: &FlattenOptions,
    prefixes: &mut Vec<(String, String)>,
) -> Result<()> {
    let pushed = element.namespace_decls.len();
    prefixes.extend(element.namespace_decls.iter().cloned());

    let qualified = qualified_name(&element.namespace_uri, &element.name, prefixes);
    let mut start = BytesStart::new(qualified.clone());

    for (prefix, uri) in &element.namespace_decls {
        if prefix.is_empty() {
            start.push_attribute(("xmlns", uri.as_str()));
        } else {
            start.push_attribute((format!("xmlns:{}", prefix).as_str(), uri.as_str()));
        }
    }

    for attr in &element.attributes {
        if let Some(max_sdk) = options.max_sdk_level {
            if attr.namespace_uri == SCHEMA_ANDROID && attr.sdk_level > max_sdk {
                continue;
            }
        }
        let name = qualified_name(&attr.namespace_uri, &attr.name, prefixes);
        let value = match (&attr.compiled_value, options.keep_raw_values) {
            (Some(item), false) => item.to_string(),
            _ => attr.value.clone(),
        };
        start.push_attribute((name.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .context("failed to write XML")?;
    } else {
        writer
            .write_event(Event::Start(start))
            .context("failed to write XML")?;
        for child in &element.children {
            match child {
                Node::Element(el) => write_element(writer, el, options, prefixes)?,
                Node::Text(text) => writer
                    .write_event(Event::Text(BytesText::new(text)))
                    .context("failed to write XML")?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(qualified)))
            .context("failed to write XML")?;
    }

    prefixes.truncate(prefixes.len() - pushed);
    Ok(())
}

fn qualified_name(namespace_uri: &str, name: &str, prefixes: &[(String, String)]) -> String {
    if namespace_uri.is_empty() {
        return name.to_string();
    }
    let prefix = prefixes
        .iter()
        .rev()
        .find(|(_, uri)| uri == namespace_uri)
        .map(|(prefix, _)| prefix.as_str())
        .unwrap_or("");
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}:{}", prefix, name)
    }
}

/// Strip namespace information from the whole document.
///
/// With `keep_uris`, only prefixes are dropped and declarations stay;
/// the manifest parser needs the URIs intact.
pub fn remove_namespaces(element: &mut Element, keep_uris: bool) {
    if !keep_uris {
        element.namespace_decls.clear();
        element.namespace_uri.clear();
        for attr in &mut element.attributes {
            attr.namespace_uri.clear();
        }
    } else {
        element.namespace_uri.clear();
        for attr in &mut element.attributes {
            attr.namespace_uri.clear();
        }
    }
    for child in element.child_elements_mut() {
        remove_namespaces(child, keep_uris);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android"
    android:orientation="vertical">
    <TextView android:text="@string/app_name" />
</LinearLayout>"#;

    fn inflate_ok(xml: &str) -> XmlResource {
        let diag = Diagnostics::capturing();
        let doc = inflate(xml.as_bytes(), &Source::new("res/layout/main.xml"), &diag);
        assert_eq!(diag.error_count(), 0, "{:?}", diag.captured());
        doc.unwrap()
    }

    #[test]
    fn test_inflate_resolves_namespaces() {
        let doc = inflate_ok(LAYOUT);
        assert_eq!(doc.root.name, "LinearLayout");
        let orientation = doc.root.find_attribute(SCHEMA_ANDROID, "orientation").unwrap();
        assert_eq!(orientation.value, "vertical");

        let text_view = doc.root.find_child("", "TextView").unwrap();
        assert_eq!(text_view.line, 3);
        assert!(text_view.find_attribute(SCHEMA_ANDROID, "text").is_some());
    }

    #[test]
    fn test_inflate_rejects_unknown_prefix() {
        let diag = Diagnostics::capturing();
        let result = inflate(
            b"<view app:attr=\"x\" />",
            &Source::new("bad.xml"),
            &diag,
        );
        assert!(result.is_none());
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_inflate_rejects_malformed() {
        let diag = Diagnostics::capturing();
        assert!(inflate(b"<a><b></a>", &Source::new("bad.xml"), &diag).is_none());
        assert!(diag.error_count() > 0);
    }

    #[test]
    fn test_flatten_round_trip() {
        let doc = inflate_ok(LAYOUT);
        let bytes = flatten(&doc, &FlattenOptions::default()).unwrap();
        let again = inflate_ok(std::str::from_utf8(&bytes).unwrap());
        assert_eq!(again.root.name, "LinearLayout");
        assert!(again
            .root
            .find_child("", "TextView")
            .unwrap()
            .find_attribute(SCHEMA_ANDROID, "text")
            .is_some());
    }

    #[test]
    fn test_flatten_prefers_compiled_values() {
        let mut doc = inflate_ok(LAYOUT);
        if let Some(Node::Element(text_view)) = doc.root.children.first_mut() {
            text_view.attributes[0].compiled_value =
                Some(Item::Reference(crate::core::value::Reference {
                    id: Some(crate::core::id::ResourceId(0x7f010000)),
                    ..Default::default()
                }));
        }

        let flat = String::from_utf8(flatten(&doc, &FlattenOptions::default()).unwrap()).unwrap();
        assert!(flat.contains("@0x7f010000"));

        let raw = String::from_utf8(
            flatten(
                &doc,
                &FlattenOptions {
                    keep_raw_values: true,
                    ..Default::default()
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert!(raw.contains("@string/app_name"));
    }

    #[test]
    fn test_flatten_drops_attributes_above_max_sdk() {
        let mut doc = inflate_ok(LAYOUT);
        doc.root.attributes[0].sdk_level = 21;

        let flat = String::from_utf8(
            flatten(
                &doc,
                &FlattenOptions {
                    max_sdk_level: Some(15),
                    ..Default::default()
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert!(!flat.contains("orientation"));

        let kept = String::from_utf8(
            flatten(
                &doc,
                &FlattenOptions {
                    max_sdk_level: Some(21),
                    ..Default::default()
                },
            )
            .unwrap(),
        )
        .unwrap();
        assert!(kept.contains("orientation"));
    }

    #[test]
    fn test_remove_namespaces() {
        let mut doc = inflate_ok(LAYOUT);
        remove_namespaces(&mut doc.root, false);
        let flat = String::from_utf8(flatten(&doc, &FlattenOptions::default()).unwrap()).unwrap();
        assert!(!flat.contains("xmlns"));
        assert!(flat.contains("orientation=\"vertical\""));
    }

    #[test]
    fn test_package_for_namespace() {
        assert_eq!(
            package_for_namespace(SCHEMA_ANDROID),
            Some(("android".to_string(), false))
        );
        assert_eq!(
            package_for_namespace(SCHEMA_RES_AUTO),
            Some((String::new(), false))
        );
        assert_eq!(
            package_for_namespace("http://schemas.android.com/apk/prv/res/com.x"),
            Some(("com.x".to_string(), true))
        );
        assert_eq!(package_for_namespace("http://other"), None);
    }
}
