//! Table merging with overlay and mangle policies.
//!
//! The merger drains source tables into the final table. Destination
//! packages collapse onto the compilation package (the `android`
//! package keeps its name); library packages merged with mangling have
//! every entry renamed through the mangler and are recorded so the
//! reference linker can recognize their original spelling.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::codec::compiled::CompiledFileEntry;
use crate::core::mangle::NameMangler;
use crate::core::name::ResourceName;
use crate::core::table::{resolve_value_collision, CollisionResult, ConfigValue, ResourceTable};
use crate::core::value::{Source, Value, ValueKind};
use crate::io::file::{InputFile, ZipFileCollection};
use crate::util::Diagnostics;

/// Merge failures, reported through diagnostics with their source.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("duplicate value for resource '{name}' with config '{config}'")]
    Conflict { name: String, config: String },

    #[error("resource '{name}' does not override an existing resource")]
    NoBaseResource { name: String },

    #[error("can't assign ID to type '{ty}' from merged table")]
    TypeIdPreAssigned { ty: String },
}

/// Options controlling collision behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableMergerOptions {
    /// Let overlays introduce resources that have no base definition.
    pub auto_add_overlay: bool,
}

/// Merges source tables into the driver-owned final table.
pub struct TableMerger<'a> {
    table: &'a mut ResourceTable,
    compilation_package: String,
    options: TableMergerOptions,
    merged_packages: BTreeSet<String>,
}

impl<'a> TableMerger<'a> {
    /// The final table gets its compilation package (with its ID)
    /// created up front so later stages always find it.
    pub fn new(
        table: &'a mut ResourceTable,
        compilation_package: &str,
        package_id: u8,
        options: TableMergerOptions,
    ) -> Self {
        let package = table.find_or_create_package(compilation_package);
        package.id = Some(package_id);
        TableMerger {
            table,
            compilation_package: compilation_package.to_string(),
            options,
            merged_packages: BTreeSet::new(),
        }
    }

    /// Packages that were merged with mangling.
    pub fn merged_packages(&self) -> &BTreeSet<String> {
        &self.merged_packages
    }

    /// Merge with default collision semantics.
    pub fn merge(
        &mut self,
        src: &Source,
        table: ResourceTable,
        collection: Option<&ZipFileCollection>,
        diag: &Diagnostics,
    ) -> bool {
        self.merge_impl(src, table, None, collection, false, diag)
    }

    /// Merge letting incoming values replace existing ones.
    pub fn merge_overlay(
        &mut self,
        src: &Source,
        table: ResourceTable,
        collection: Option<&ZipFileCollection>,
        diag: &Diagnostics,
    ) -> bool {
        self.merge_impl(src, table, None, collection, true, diag)
    }

    /// Merge a library table, mangling entry names into the
    /// compilation package.
    pub fn merge_and_mangle(
        &mut self,
        src: &Source,
        package_name: &str,
        table: ResourceTable,
        collection: Option<&ZipFileCollection>,
        diag: &Diagnostics,
    ) -> bool {
        self.merged_packages.insert(package_name.to_string());
        self.merge_impl(src, table, Some(package_name), collection, false, diag)
    }

    fn merge_impl(
        &mut self,
        src: &Source,
        src_table: ResourceTable,
        mangle_package: Option<&str>,
        collection: Option<&ZipFileCollection>,
        overlay: bool,
        diag: &Diagnostics,
    ) -> bool {
        let mut error = false;
        for src_package in src_table.packages {
            // The framework package keeps its name; everything else
            // lands in the compilation package.
            let dst_package_name = if src_package.name == "android" {
                "android".to_string()
            } else {
                self.compilation_package.clone()
            };

            for src_type in src_package.types {
                if let Some(id) = src_type.id {
                    // Merged inputs must arrive unassigned; IDs are
                    // handed out once, after merging.
                    let dst_type = self
                        .table
                        .find_or_create_package(&dst_package_name)
                        .find_or_create_type(src_type.ty);
                    if dst_type.id.is_some() && dst_type.id != Some(id) {
                        diag.error_at(
                            src,
                            MergeError::TypeIdPreAssigned {
                                ty: src_type.ty.to_string(),
                            }
                            .to_string(),
                        );
                        error = true;
                        continue;
                    }
                }

                for src_entry in src_type.entries {
                    let entry_name = match mangle_package {
                        Some(package) if src_package.name != "android" => {
                            NameMangler::mangle_entry(package, &src_entry.name)
                        }
                        _ => src_entry.name.clone(),
                    };
                    let dst_name =
                        ResourceName::new(dst_package_name.clone(), src_type.ty, entry_name);

                    let dst_entry = self
                        .table
                        .find_or_create_package(&dst_package_name)
                        .find_or_create_type(src_type.ty)
                        .find_or_create_entry(&dst_name.entry);

                    // Visibility merges toward the stricter declaration.
                    if src_entry.visibility > dst_entry.visibility {
                        dst_entry.visibility = src_entry.visibility;
                        dst_entry.visibility_source = src_entry.visibility_source.clone();
                    }

                    let had_values = !dst_entry.values.is_empty();
                    for mut src_value in src_entry.values {
                        // Re-bind file payloads against the collection
                        // this table was loaded from.
                        if let (Some(collection), Some(file_ref)) =
                            (collection, src_value.value.as_file_reference_mut())
                        {
                            if file_ref.file.is_none() {
                                file_ref.file = collection.find_file(&file_ref.path).cloned();
                            }
                        }

                        if !self.merge_value(
                            &dst_name, dst_package_name.clone(), src_type.ty, src_value,
                            overlay, had_values, src, diag,
                        ) {
                            error = true;
                        }
                    }
                }
            }
        }
        !error
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_value(
        &mut self,
        dst_name: &ResourceName,
        dst_package_name: String,
        ty: crate::core::name::ResourceType,
        src_value: ConfigValue,
        overlay: bool,
        had_values: bool,
        src: &Source,
        diag: &Diagnostics,
    ) -> bool {
        let dst_entry = self
            .table
            .find_or_create_package(&dst_package_name)
            .find_or_create_type(ty)
            .find_or_create_entry(&dst_name.entry);

        let existing = dst_entry.find_value_mut(&src_value.config, &src_value.product);
        match existing {
            None => {
                if overlay && !had_values && !self.options.auto_add_overlay {
                    diag.error_at(
                        &src_value.value.source,
                        MergeError::NoBaseResource {
                            name: dst_name.to_string(),
                        }
                        .to_string(),
                    );
                    return false;
                }
                dst_entry.values.push(src_value);
                true
            }
            Some(existing) => {
                if overlay {
                    existing.value = src_value.value;
                    return true;
                }
                match resolve_value_collision(&existing.value, &src_value.value) {
                    CollisionResult::KeepOriginal => true,
                    CollisionResult::TakeNew => {
                        existing.value = src_value.value;
                        true
                    }
                    CollisionResult::Conflict => {
                        diag.error_at(
                            &src_value.value.source,
                            MergeError::Conflict {
                                name: dst_name.to_string(),
                                config: src_value.config.to_string(),
                            }
                            .to_string(),
                        );
                        diag.note_at(src, "while merging this input");
                        false
                    }
                }
            }
        }
    }

    /// Merge one compiled file into the table as a file reference.
    pub fn merge_file(
        &mut self,
        desc: &CompiledFileEntry,
        file: Arc<InputFile>,
        overlay: bool,
        diag: &Diagnostics,
    ) -> bool {
        let mut name = desc.name.clone();
        if !name.has_package() {
            name.package = self.compilation_package.clone();
        }

        let dst_path = build_resource_file_name(&name, &desc.config, &desc.source);
        let value = ConfigValue {
            config: desc.config.clone(),
            product: String::new(),
            value: Value::new(
                desc.source.clone(),
                ValueKind::Item(crate::core::value::Item::FileReference(
                    crate::core::value::FileReference {
                        path: dst_path,
                        file: Some(file),
                    },
                )),
            ),
        };

        let had_values = self
            .table
            .find_resource(&name)
            .map(|e| !e.values.is_empty())
            .unwrap_or(false);
        let package = name.package.clone();
        self.merge_value(&name, package, name.ty, value, overlay, had_values, &desc.source, diag)
    }
}

/// Destination path of a file resource inside the archive:
/// `res/<type>[-<config>]/<entry>[.<ext>]`.
pub fn build_resource_file_name(
    name: &ResourceName,
    config: &crate::core::config::ConfigDescription,
    source: &Source,
) -> String {
    let extension = source
        .path
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    let mut out = String::from("res/");
    out.push_str(name.ty.as_str());
    if !config.is_default() {
        out.push('-');
        out.push_str(&config.to_string());
    }
    out.push('/');
    out.push_str(&name.entry);
    if let Some(extension) = extension {
        out.push('.');
        out.push_str(&extension);
    }
    out
}

/// Record an `Id` marker for a symbol a compiled file exports.
pub fn add_exported_symbol(
    table: &mut ResourceTable,
    mangler: &NameMangler,
    compilation_package: &str,
    symbol: &ResourceName,
    source: Source,
    diag: &Diagnostics,
) -> bool {
    let mut name = symbol.clone();
    if !name.has_package() {
        name.package = compilation_package.to_string();
    }
    if let Some(mangled) = mangler.mangle_name(&name) {
        name = mangled;
    }

    let value = Value::new(source, ValueKind::Id);
    table.add_resource_allow_mangled(&name, &Default::default(), "", value, diag)
}
