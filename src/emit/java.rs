//! Generated source classes: `R.java` and `Manifest.java`.

use std::fmt::Write as _;

use anyhow::{bail, Result};

use crate::codec::xml::{XmlResource, SCHEMA_ANDROID};
use crate::core::id::ResourceId;
use crate::core::mangle::NameMangler;
use crate::core::name::ResourceType;
use crate::core::table::ResourceTable;
use crate::core::value::{Item, ValueKind, Visibility};

/// Which symbols land in the generated class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolTypes {
    #[default]
    All,
    PublicOnly,
    PublicAndPrivate,
}

/// Options for R-class generation.
#[derive(Debug, Clone, Default)]
pub struct JavaClassGeneratorOptions {
    /// `final` fields allow the compiler to inline IDs; static
    /// libraries must not.
    pub use_final: bool,
    pub types: SymbolTypes,
    pub javadoc_annotations: Vec<String>,
}

fn field_name(entry: &str) -> String {
    entry.replace(['.', '-'], "_")
}

fn included(visibility: Visibility, types: SymbolTypes) -> bool {
    match types {
        SymbolTypes::All => true,
        SymbolTypes::PublicOnly => visibility == Visibility::Public,
        SymbolTypes::PublicAndPrivate => true,
    }
}

/// Generate the `R` class for `package_to_generate`, emitted under
/// `out_package`.
///
/// Entries mangled from a library are emitted (unmangled) when the
/// library package is the one being generated, and skipped otherwise.
pub fn generate_r_class(
    table: &ResourceTable,
    package_to_generate: &str,
    out_package: &str,
    options: &JavaClassGeneratorOptions,
) -> Result<String> {
    let mut out = String::new();
    out.push_str(
        "/* AUTO-GENERATED FILE. DO NOT MODIFY.\n *\n * This class was automatically generated by\n * reslink from the resource data it found.\n */\n\n",
    );
    writeln!(out, "package {};", out_package)?;
    out.push('\n');
    for annotation in &options.javadoc_annotations {
        writeln!(out, "/** @{} */", annotation)?;
    }
    out.push_str("public final class R {\n");

    let modifiers = if options.use_final {
        "public static final int"
    } else {
        "public static int"
    };

    for package in &table.packages {
        for group in &package.types {
            let mut fields: Vec<String> = Vec::new();

            for entry in &group.entries {
                if !included(entry.visibility, options.types) {
                    continue;
                }

                // Decide which generated package owns this entry.
                let (owning_package, local_name) =
                    match NameMangler::unmangle_entry(&entry.name) {
                        Some((mangled_package, local)) => (
                            if NameMangler::package_matches(mangled_package, package_to_generate) {
                                package_to_generate.to_string()
                            } else {
                                mangled_package.to_string()
                            },
                            local.to_string(),
                        ),
                        None => (package.name.clone(), entry.name.clone()),
                    };
                if owning_package != package_to_generate {
                    continue;
                }

                let id = match (package.id, group.id, entry.id) {
                    (Some(p), Some(t), Some(e)) => ResourceId::new(p, t, e),
                    _ => ResourceId(0),
                };

                if group.ty == ResourceType::Styleable {
                    fields.push(styleable_field(entry, &local_name, options)?);
                } else {
                    fields.push(format!(
                        "        {} {} = {};",
                        modifiers,
                        field_name(&local_name),
                        id
                    ));
                }
            }

            if fields.is_empty() {
                continue;
            }
            let class_name = match group.ty {
                // `^attr-private` is not a legal Java identifier.
                ResourceType::AttrPrivate => "attr_private".to_string(),
                other => other.as_str().to_string(),
            };
            writeln!(out, "    public static final class {} {{", class_name)?;
            for field in fields {
                out.push_str(&field);
                out.push('\n');
            }
            out.push_str("    }\n");
        }
    }

    out.push_str("}\n");
    Ok(out)
}

fn styleable_field(
    entry: &crate::core::table::Entry,
    local_name: &str,
    options: &JavaClassGeneratorOptions,
) -> Result<String> {
    let Some(cv) = entry.values.first() else {
        bail!("styleable '{}' has no value", entry.name);
    };
    let ids: Vec<String> = match &cv.value.kind {
        ValueKind::Array(items) => items
            .iter()
            .map(|item| match item {
                Item::Reference(r) => r.id.unwrap_or(ResourceId(0)).to_string(),
                _ => ResourceId(0).to_string(),
            })
            .collect(),
        _ => bail!("styleable '{}' is not an array", entry.name),
    };
    let modifiers = if options.use_final {
        "public static final int[]"
    } else {
        "public static int[]"
    };
    Ok(format!(
        "        {} {} = {{ {} }};",
        modifiers,
        field_name(local_name),
        ids.join(", ")
    ))
}

/// Generate `Manifest.java` with permission constants; returns `None`
/// when the manifest declares none.
pub fn generate_manifest_class(doc: &XmlResource, package: &str) -> Option<String> {
    let mut permissions: Vec<String> = doc
        .root
        .child_elements()
        .filter(|el| el.name == "permission" && el.namespace_uri.is_empty())
        .filter_map(|el| el.find_attribute(SCHEMA_ANDROID, "name"))
        .map(|attr| attr.value.clone())
        .collect();
    permissions.sort();
    permissions.dedup();

    if permissions.is_empty() {
        return None;
    }

    let mut out = String::new();
    out.push_str(
        "/* AUTO-GENERATED FILE. DO NOT MODIFY.\n *\n * This class was automatically generated by\n * reslink from the manifest it found.\n */\n\n",
    );
    let _ = writeln!(out, "package {};", package);
    out.push_str("\npublic final class Manifest {\n    public static final class permission {\n");
    for permission in permissions {
        let constant = permission
            .rsplit('.')
            .next()
            .unwrap_or(&permission)
            .to_uppercase();
        let _ = writeln!(
            out,
            "        public static final String {} = \"{}\";",
            constant, permission
        );
    }
    out.push_str("    }\n}\n");
    Some(out)
}
