//! File flattening: per-file XML linking, versioning, and archive
//! emission.
//!
//! Within one type, entries are written in (config, entry-name) order
//! for archive locality and deterministic output. XML files pass
//! through the reference linker and may enqueue versioned clones of
//! themselves; binary files are copied with compression decided by
//! extension.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::codec::xml::{self, FlattenOptions, XmlResource};
use crate::core::config::ConfigDescription;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::table::ResourceTable;
use crate::core::value::Source;
use crate::emit::proguard::{collect_xml_rules, KeepSet};
use crate::io::archive::{write_whole_entry, ArchiveWriter, Compression};
use crate::io::file::InputFile;
use crate::link::merge::build_resource_file_name;
use crate::link::reference::link_xml_references;
use crate::link::versions::should_generate_versioned_resource;
use crate::link::LinkContext;

/// Options for [`ResourceFileFlattener`].
#[derive(Debug, Clone, Default)]
pub struct FileFlattenerOptions {
    pub no_auto_version: bool,
    pub no_version_vectors: bool,
    pub no_xml_namespaces: bool,
    pub keep_raw_values: bool,
    pub do_not_compress_anything: bool,
    pub update_proguard_spec: bool,
    pub extensions_to_not_compress: BTreeSet<String>,
}

enum Payload {
    Xml(Box<XmlResource>),
    Copy(Arc<InputFile>),
}

struct FileOperation {
    config: ConfigDescription,
    entry_name: String,
    dst_path: String,
    payload: Payload,
    skip_version: bool,
}

/// Drives per-file processing for every file reference in the table.
pub struct ResourceFileFlattener<'a> {
    options: FileFlattenerOptions,
    ctx: &'a LinkContext,
    keep_set: &'a mut KeepSet,
}

impl<'a> ResourceFileFlattener<'a> {
    pub fn new(
        options: FileFlattenerOptions,
        ctx: &'a LinkContext,
        keep_set: &'a mut KeepSet,
    ) -> Self {
        ResourceFileFlattener {
            options,
            ctx,
            keep_set,
        }
    }

    fn compression_for(&self, path: &str) -> Compression {
        if self.options.do_not_compress_anything {
            return Compression::Store;
        }
        for extension in &self.options.extensions_to_not_compress {
            if path.ends_with(extension.as_str()) {
                return Compression::Store;
            }
        }
        Compression::Deflate
    }

    /// Flatten every file reference into the archive.
    pub fn flatten(
        &mut self,
        table: &mut ResourceTable,
        writer: &mut dyn ArchiveWriter,
    ) -> bool {
        for package_index in 0..table.packages.len() {
            for type_index in 0..table.packages[package_index].types.len() {
                if !self.flatten_type(table, package_index, type_index, writer) {
                    return false;
                }
            }
        }
        true
    }

    fn flatten_type(
        &mut self,
        table: &mut ResourceTable,
        package_index: usize,
        type_index: usize,
        writer: &mut dyn ArchiveWriter,
    ) -> bool {
        let mut queue: VecDeque<FileOperation> = VecDeque::new();
        let mut sorted: BTreeMap<(ConfigDescription, String), FileOperation> = BTreeMap::new();
        let package_name = table.packages[package_index].name.clone();
        let ty = table.packages[package_index].types[type_index].ty;

        // Collect one operation per file reference.
        {
            let group = &table.packages[package_index].types[type_index];
            for entry in &group.entries {
                for cv in &entry.values {
                    let Some(file_ref) = cv.value.as_file_reference() else {
                        continue;
                    };
                    let Some(file) = &file_ref.file else {
                        self.ctx
                            .diag
                            .error_at(&cv.value.source, "file not found");
                        return false;
                    };

                    let src_path = file.source().path.to_string_lossy().into_owned();
                    let is_xml = ty != ResourceType::Raw
                        && (src_path.ends_with(".xml") || src_path.ends_with(".xml.flat"));

                    if is_xml {
                        let data = match file.data() {
                            Ok(data) => data,
                            Err(err) => {
                                self.ctx
                                    .diag
                                    .error_at(file.source(), format!("failed to open: {:#}", err));
                                return false;
                            }
                        };
                        let Some(mut doc) =
                            xml::inflate(&data, &cv.value.source, &self.ctx.diag)
                        else {
                            return false;
                        };
                        doc.name = ResourceName::new(package_name.clone(), ty, entry.name.clone());
                        doc.config = cv.config.clone();

                        queue.push_back(FileOperation {
                            config: cv.config.clone(),
                            entry_name: entry.name.clone(),
                            dst_path: file_ref.path.clone(),
                            payload: Payload::Xml(Box::new(doc)),
                            skip_version: false,
                        });
                    } else {
                        sorted.insert(
                            (cv.config.clone(), entry.name.clone()),
                            FileOperation {
                                config: cv.config.clone(),
                                entry_name: entry.name.clone(),
                                dst_path: file_ref.path.clone(),
                                payload: Payload::Copy(Arc::clone(file)),
                                skip_version: false,
                            },
                        );
                    }
                }
            }
        }

        // Link and version the XML queue; clones re-enter the queue.
        let mut error = false;
        while let Some(mut op) = queue.pop_front() {
            if !self.link_and_version(table, &mut op, &mut queue) {
                error = true;
                continue;
            }
            sorted.insert((op.config.clone(), op.entry_name.clone()), op);
        }
        if error {
            return false;
        }

        // Emit in sorted order.
        for ((config, _), op) in sorted {
            let ok = match &op.payload {
                Payload::Xml(doc) => {
                    let max_sdk_level =
                        if self.options.no_auto_version || op.skip_version {
                            None
                        } else {
                            Some(
                                config
                                    .sdk_version
                                    .max(1)
                                    .max(self.ctx.min_sdk_version),
                            )
                        };
                    tracing::debug!(path = %op.dst_path, ?max_sdk_level, "flattening xml");
                    let flatten_options = FlattenOptions {
                        keep_raw_values: self.options.keep_raw_values,
                        max_sdk_level,
                    };
                    match xml::flatten(doc, &flatten_options) {
                        Ok(data) => write_whole_entry(
                            writer,
                            &op.dst_path,
                            Compression::Deflate,
                            &data,
                        )
                        .map_err(|err| {
                            self.ctx
                                .diag
                                .error(format!("failed to write {}: {:#}", op.dst_path, err))
                        })
                        .is_ok(),
                        Err(err) => {
                            self.ctx
                                .diag
                                .error(format!("failed to flatten {}: {:#}", op.dst_path, err));
                            false
                        }
                    }
                }
                Payload::Copy(file) => {
                    tracing::debug!(path = %op.dst_path, "copying file");
                    match file.data() {
                        Ok(data) => write_whole_entry(
                            writer,
                            &op.dst_path,
                            self.compression_for(&op.dst_path),
                            &data,
                        )
                        .map_err(|err| {
                            self.ctx
                                .diag
                                .error(format!("failed to write {}: {:#}", op.dst_path, err))
                        })
                        .is_ok(),
                        Err(err) => {
                            self.ctx
                                .diag
                                .error_at(file.source(), format!("failed to open: {:#}", err));
                            false
                        }
                    }
                }
            };
            if !ok {
                error = true;
            }
        }
        !error
    }

    fn link_and_version(
        &mut self,
        table: &mut ResourceTable,
        op: &mut FileOperation,
        queue: &mut VecDeque<FileOperation>,
    ) -> bool {
        let Payload::Xml(doc) = &mut op.payload else {
            return true;
        };
        tracing::debug!(source = %doc.source, "linking xml file");

        let result = link_xml_references(doc, table, self.ctx);
        if !result.success {
            return false;
        }

        if self.options.update_proguard_spec {
            let source = doc.source.clone();
            collect_xml_rules(&source, doc, self.keep_set);
        }

        if self.options.no_xml_namespaces {
            xml::remove_namespaces(&mut doc.root, false);
        }

        if self.options.no_auto_version {
            return true;
        }

        if self.options.no_version_vectors
            && doc.root.namespace_uri.is_empty()
            && (doc.root.name == "vector" || doc.root.name == "animated-vector")
        {
            op.skip_version = true;
            return true;
        }

        let min_sdk = self.ctx.min_sdk_version;
        for level in result.sdk_levels {
            if level <= min_sdk || level <= op.config.sdk_version {
                continue;
            }

            let name = doc.name.clone();
            let Some(entry) = table.find_resource(&name) else {
                continue;
            };
            if !should_generate_versioned_resource(entry, &op.config, level) {
                // A sibling supersedes this level; later ones too.
                break;
            }

            let versioned_config = op.config.with_sdk_version(level);
            let source_for_ext = Source::new(op.dst_path.clone());
            let dst_path = build_resource_file_name(&name, &versioned_config, &source_for_ext);

            tracing::debug!(
                from = %op.config,
                to = %versioned_config,
                "auto-versioning resource"
            );

            let mut clone = doc.clone();
            clone.config = versioned_config.clone();
            if !table.add_file_reference(
                &name,
                &versioned_config,
                clone.source.clone(),
                dst_path.clone(),
                None,
                &self.ctx.diag,
            ) {
                return false;
            }

            queue.push_back(FileOperation {
                config: versioned_config,
                entry_name: op.entry_name.clone(),
                dst_path,
                payload: Payload::Xml(clone),
                skip_version: false,
            });
            break;
        }
        true
    }
}
