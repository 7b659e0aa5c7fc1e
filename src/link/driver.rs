//! The link pipeline driver.
//!
//! Owns the final table and the input collections, sequences the
//! stages, and stops at the first stage that reports failure. All
//! user-facing problems go through the diagnostics sink; `run` only
//! converts "this stage failed" into an error for the caller.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::codec::{binary, compiled, table as table_codec, xml};
use crate::core::id::{ResourceId, PACKAGE_APP, PACKAGE_FRAMEWORK};
use crate::core::mangle::{NameMangler, NameManglerPolicy};
use crate::core::name::ResourceName;
use crate::core::table::ResourceTable;
use crate::core::value::Source;
use crate::emit::java::{
    generate_manifest_class, generate_r_class, JavaClassGeneratorOptions, SymbolTypes,
};
use crate::emit::proguard::{collect_manifest_rules, KeepSet};
use crate::io::archive::{
    write_whole_entry, ArchiveWriter, Compression, DirectoryArchiveWriter, ZipArchiveWriter,
};
use crate::io::file::{FileCollection, InputFile, ZipFileCollection};
use crate::link::filter::ProductFilter;
use crate::link::flatten::{FileFlattenerOptions, ResourceFileFlattener};
use crate::link::ids::{
    assign_ids, emit_stable_id_map, move_private_attributes, verify_no_ids,
};
use crate::link::manifest::{
    extract_app_info, fix_manifest, generate_split_manifest, AppInfo, ManifestFixerOptions,
};
use crate::link::merge::{add_exported_symbol, TableMerger, TableMergerOptions};
use crate::link::reference::{link_table_references, link_xml_references};
use crate::link::split::{
    adjust_split_constraints, SplitConstraints, TableSplitter, TableSplitterOptions,
};
use crate::link::symbols::{AssetSymbolSource, TableSymbolSource};
use crate::link::versions::{collapse_versions, version_styles};
use crate::link::LinkContext;
use crate::util::fs as util_fs;

/// Everything the CLI hands to the pipeline.
#[derive(Debug, Default)]
pub struct LinkOptions {
    pub output_path: PathBuf,
    pub manifest_path: PathBuf,
    pub include_paths: Vec<PathBuf>,
    pub overlay_files: Vec<String>,

    // Java / shrinker outputs.
    pub generate_java_class_path: Option<PathBuf>,
    pub custom_java_package: Option<String>,
    pub extra_java_packages: BTreeSet<String>,
    pub generate_proguard_rules_path: Option<PathBuf>,
    pub generate_main_dex_proguard_rules_path: Option<PathBuf>,
    pub javadoc_annotations: Vec<String>,
    pub generate_non_final_ids: bool,
    pub private_symbols: Option<String>,

    pub no_auto_version: bool,
    pub no_version_vectors: bool,
    pub static_lib: bool,
    pub no_static_lib_packages: bool,
    pub output_to_directory: bool,
    pub no_xml_namespaces: bool,
    pub auto_add_overlay: bool,
    pub do_not_compress_anything: bool,
    pub extensions_to_not_compress: BTreeSet<String>,
    pub products: BTreeSet<String>,
    pub manifest_fixer_options: ManifestFixerOptions,

    /// `-x`: force the framework package ID.
    pub legacy_package_id: bool,

    // Split outputs.
    pub table_splitter_options: TableSplitterOptions,
    pub split_constraints: Vec<SplitConstraints>,
    pub split_paths: Vec<PathBuf>,

    // Stable IDs.
    pub stable_id_map: HashMap<ResourceName, ResourceId>,
    pub emit_id_map_path: Option<PathBuf>,
}

/// The pipeline. Owns the final table and keeps every opened input
/// collection alive until the link finishes, because table values hold
/// handles into them.
pub struct LinkCommand {
    options: LinkOptions,
    ctx: LinkContext,
    final_table: ResourceTable,
    file_collection: FileCollection,
    collections: Vec<ZipFileCollection>,
    static_includes: Vec<Rc<ResourceTable>>,
    merged_packages: BTreeSet<String>,
}

impl LinkCommand {
    pub fn new(options: LinkOptions, ctx: LinkContext) -> Self {
        LinkCommand {
            options,
            ctx,
            final_table: ResourceTable::new(),
            file_collection: FileCollection::new(),
            collections: Vec::new(),
            static_includes: Vec::new(),
            merged_packages: BTreeSet::new(),
        }
    }

    fn load_xml(&self, path: &Path) -> Option<xml::XmlResource> {
        let source = Source::new(path);
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                self.ctx.diag.error_at(&source, err.to_string());
                return None;
            }
        };
        xml::inflate(&data, &source, &self.ctx.diag)
    }

    /// Load `-I` includes: static library tables become symbol sources
    /// (and must only appear when building a static library); binary
    /// tables inside the archives feed the asset-backed source.
    fn load_symbols_from_include_paths(&mut self) -> bool {
        let mut asset_source = AssetSymbolSource::new();
        for path in self.options.include_paths.clone() {
            tracing::debug!(path = %path.display(), "loading include path");
            let source = Source::new(&path);

            let collection = match ZipFileCollection::open(&path) {
                Ok(collection) => collection,
                Err(err) => {
                    self.ctx
                        .diag
                        .error_at(&source, format!("failed to load include path: {:#}", err));
                    return false;
                }
            };

            if let Some(file) = collection.find_file("resources.arsc.flat") {
                if !self.options.static_lib {
                    self.ctx.diag.error_at(
                        &source,
                        "can't include static library when building app",
                    );
                    return false;
                }
                let data = match file.data() {
                    Ok(data) => data,
                    Err(err) => {
                        self.ctx.diag.error_at(&source, format!("{:#}", err));
                        return false;
                    }
                };
                let Some(mut table) =
                    table_codec::deserialize_table(&data, file.source(), &self.ctx.diag)
                else {
                    return false;
                };
                if self.options.no_static_lib_packages {
                    if let Some(package) = table.find_package_by_id_mut(PACKAGE_APP) {
                        package.name = self.ctx.compilation_package.clone();
                    }
                }
                let table = Rc::new(table);
                self.ctx
                    .symbols
                    .append_source(Box::new(TableSymbolSource::new(Rc::clone(&table), true)));
                self.static_includes.push(table);
            } else if let Some(file) = collection.find_file("resources.arsc") {
                let data = match file.data() {
                    Ok(data) => data,
                    Err(err) => {
                        self.ctx.diag.error_at(&source, format!("{:#}", err));
                        return false;
                    }
                };
                match binary::parse_table(&data) {
                    Ok(entries) => asset_source.add_entries(&entries),
                    Err(err) => {
                        self.ctx
                            .diag
                            .error_at(&source, format!("failed to load include path: {:#}", err));
                        return false;
                    }
                }
            } else {
                self.ctx
                    .diag
                    .error_at(&source, "include has no resource table");
                return false;
            }
        }
        self.ctx.symbols.append_source(Box::new(asset_source));
        true
    }

    fn merger_options(&self) -> TableMergerOptions {
        TableMergerOptions {
            auto_add_overlay: self.options.auto_add_overlay,
        }
    }

    /// Merge one path: archives fan out into their entries, `.apk` is a
    /// static library, everything else is a loose file.
    fn merge_path(&mut self, path: &str, overlay: bool) -> bool {
        if [".flata", ".jar", ".jack", ".zip"]
            .iter()
            .any(|ext| path.ends_with(ext))
        {
            return self.merge_archive(path, overlay);
        }
        if path.ends_with(".apk") {
            return self.merge_static_library(path, overlay);
        }

        let file = self.file_collection.insert_file(path);
        self.merge_file(file, overlay, true)
    }

    fn merge_archive(&mut self, path: &str, overlay: bool) -> bool {
        tracing::debug!(path, overlay, "merging archive");
        let collection = match ZipFileCollection::open(Path::new(path)) {
            Ok(collection) => collection,
            Err(err) => {
                self.ctx
                    .diag
                    .error_at(&Source::new(path), format!("{:#}", err));
                return false;
            }
        };

        let mut error = false;
        for file in collection.files().iter().cloned().collect::<Vec<_>>() {
            if !self.merge_file(file, overlay, false) {
                error = true;
            }
        }
        self.collections.push(collection);
        !error
    }

    fn merge_static_library(&mut self, path: &str, overlay: bool) -> bool {
        tracing::debug!(path, "merging static library");
        let source = Source::new(path);
        let collection = match ZipFileCollection::open(Path::new(path)) {
            Ok(collection) => collection,
            Err(err) => {
                self.ctx.diag.error_at(&source, format!("{:#}", err));
                return false;
            }
        };

        let Some(file) = collection.find_file("resources.arsc.flat") else {
            self.ctx.diag.error_at(&source, "invalid static library");
            return false;
        };
        let data = match file.data() {
            Ok(data) => data,
            Err(err) => {
                self.ctx.diag.error_at(&source, format!("{:#}", err));
                return false;
            }
        };
        let Some(mut table) =
            table_codec::deserialize_table(&data, file.source(), &self.ctx.diag)
        else {
            return false;
        };

        let Some(package) = table.find_package_by_id_mut(PACKAGE_APP) else {
            self.ctx
                .diag
                .error_at(&source, "static library has no package");
            return false;
        };
        let package_name = package.name.clone();

        let merger_options = self.merger_options();
        let result = if self.options.no_static_lib_packages {
            // Old-style flattening into the app package; remember the
            // library package so it still gets an R class.
            if !package_name.is_empty() {
                self.options.extra_java_packages.insert(package_name);
            }
            package.name = String::new();
            let mut merger = TableMerger::new(
                &mut self.final_table,
                &self.ctx.compilation_package,
                self.ctx.package_id,
                merger_options,
            );
            if overlay {
                merger.merge_overlay(&source, table, Some(&collection), &self.ctx.diag)
            } else {
                merger.merge(&source, table, Some(&collection), &self.ctx.diag)
            }
        } else {
            let mut merger = TableMerger::new(
                &mut self.final_table,
                &self.ctx.compilation_package,
                self.ctx.package_id,
                merger_options,
            );
            let result = merger.merge_and_mangle(
                &source,
                &package_name,
                table,
                Some(&collection),
                &self.ctx.diag,
            );
            self.merged_packages
                .extend(merger.merged_packages().iter().cloned());
            result
        };

        self.collections.push(collection);
        result
    }

    /// Merge one file by extension: a serialized table, a compiled-file
    /// bundle, or (inside archives only) ignorable noise.
    fn merge_file(&mut self, file: Arc<InputFile>, overlay: bool, top_level: bool) -> bool {
        let path = file.source().path.to_string_lossy().into_owned();

        if path.ends_with(".arsc.flat") {
            tracing::debug!(path, "merging resource table");
            let data = match file.data() {
                Ok(data) => data,
                Err(err) => {
                    self.ctx
                        .diag
                        .error_at(file.source(), format!("{:#}", err));
                    return false;
                }
            };
            let Some(table) =
                table_codec::deserialize_table(&data, file.source(), &self.ctx.diag)
            else {
                return false;
            };
            let merger_options = self.merger_options();
            let mut merger = TableMerger::new(
                &mut self.final_table,
                &self.ctx.compilation_package,
                self.ctx.package_id,
                merger_options,
            );
            return if overlay {
                merger.merge_overlay(file.source(), table, None, &self.ctx.diag)
            } else {
                merger.merge(file.source(), table, None, &self.ctx.diag)
            };
        }

        if path.ends_with(".flat") {
            let data = match file.data() {
                Ok(data) => data,
                Err(err) => {
                    self.ctx
                        .diag
                        .error_at(file.source(), format!("{:#}", err));
                    return false;
                }
            };
            let entries = match compiled::parse_bundle(&data) {
                Ok(entries) => entries,
                Err(err) => {
                    self.ctx
                        .diag
                        .error_at(file.source(), format!("{:#}", err));
                    return false;
                }
            };

            for desc in entries {
                tracing::debug!(name = %desc.name, path, "merging compiled file");
                let segment = file.create_segment(desc.payload_offset, desc.payload_len);
                let merger_options = self.merger_options();
                let mut merger = TableMerger::new(
                    &mut self.final_table,
                    &self.ctx.compilation_package,
                    self.ctx.package_id,
                    merger_options,
                );
                if !merger.merge_file(&desc, segment, overlay, &self.ctx.diag) {
                    return false;
                }

                for (symbol, line) in &desc.exported_symbols {
                    if !add_exported_symbol(
                        &mut self.final_table,
                        &self.ctx.mangler,
                        &self.ctx.compilation_package,
                        symbol,
                        desc.source.with_line(*line),
                        &self.ctx.diag,
                    ) {
                        return false;
                    }
                }
            }
            return true;
        }

        if top_level {
            self.ctx
                .diag
                .error_at(file.source(), "file has unknown extension");
            return false;
        }
        // Inside an archive this could be bytecode or an asset; skip it.
        true
    }

    /// After merging, only the compilation package (and auto-generated
    /// framework IDs, which downgrade to warnings) may remain.
    fn verify_no_external_packages(&mut self) -> bool {
        let compilation_package = self.ctx.compilation_package.clone();
        let package_id = self.ctx.package_id;
        let is_external = |package: &crate::core::table::Package| {
            package.name != compilation_package || package.id != Some(package_id)
        };

        let mut error = false;
        for package in self.final_table.packages.iter().filter(|p| is_external(p)) {
            for group in &package.types {
                for entry in &group.entries {
                    let name =
                        ResourceName::new(package.name.clone(), group.ty, entry.name.clone());
                    for cv in &entry.values {
                        if cv.value.is_id_marker() && package.name == "android" {
                            self.ctx.diag.warn_at(
                                &cv.value.source,
                                format!(
                                    "generated id '{}' for external package '{}'",
                                    name, package.name
                                ),
                            );
                        } else {
                            self.ctx.diag.error_at(
                                &cv.value.source,
                                format!(
                                    "defined resource '{}' for external package '{}'",
                                    name, package.name
                                ),
                            );
                            error = true;
                        }
                    }
                }
            }
        }

        self.final_table.packages.retain(|p| !is_external(p));
        !error
    }

    fn make_archive_writer(&self, path: &Path) -> Result<Box<dyn ArchiveWriter>> {
        if self.options.output_to_directory {
            Ok(Box::new(DirectoryArchiveWriter::create(path)?))
        } else {
            Ok(Box::new(ZipArchiveWriter::create(path)?))
        }
    }

    /// Flatten the manifest, the file resources, and the table into one
    /// archive.
    fn write_apk(
        &self,
        writer: &mut dyn ArchiveWriter,
        keep_set: &mut KeepSet,
        manifest: &xml::XmlResource,
        table: &mut ResourceTable,
    ) -> Result<()> {
        let keep_raw_values = self.options.static_lib;
        let manifest_data = xml::flatten(
            manifest,
            &xml::FlattenOptions {
                keep_raw_values,
                max_sdk_level: None,
            },
        )?;
        write_whole_entry(
            writer,
            "AndroidManifest.xml",
            Compression::Deflate,
            &manifest_data,
        )?;

        let flattener_options = FileFlattenerOptions {
            no_auto_version: self.options.no_auto_version,
            no_version_vectors: self.options.no_version_vectors,
            no_xml_namespaces: self.options.no_xml_namespaces,
            keep_raw_values,
            do_not_compress_anything: self.options.do_not_compress_anything,
            update_proguard_spec: self.options.generate_proguard_rules_path.is_some(),
            extensions_to_not_compress: self.options.extensions_to_not_compress.clone(),
        };
        let mut flattener =
            ResourceFileFlattener::new(flattener_options, &self.ctx, keep_set);
        if !flattener.flatten(table, writer) {
            bail!("failed linking file resources");
        }

        if self.options.static_lib {
            let data = table_codec::serialize_table(table)?;
            write_whole_entry(writer, "resources.arsc.flat", Compression::Store, &data)?;
        } else {
            let data = binary::flatten_table(table)?;
            write_whole_entry(writer, "resources.arsc", Compression::Aligned, &data)?;
        }
        Ok(())
    }

    fn write_r_classes(&self, app_info: &AppInfo) -> Result<()> {
        let Some(java_dir) = &self.options.generate_java_class_path else {
            return Ok(());
        };

        let mut options = JavaClassGeneratorOptions {
            use_final: !(self.options.static_lib || self.options.generate_non_final_ids),
            types: SymbolTypes::All,
            javadoc_annotations: self.options.javadoc_annotations.clone(),
        };

        let actual_package = &app_info.package;
        let mut output_package = self
            .options
            .custom_java_package
            .clone()
            .unwrap_or_else(|| actual_package.clone());

        if let Some(private_package) = &self.options.private_symbols {
            // Public symbols go to the app package, everything to the
            // private package.
            options.types = SymbolTypes::PublicOnly;
            self.write_r_class(java_dir, actual_package, &output_package, &options)?;
            options.types = SymbolTypes::PublicAndPrivate;
            output_package = private_package.clone();
        }
        self.write_r_class(java_dir, actual_package, &output_package, &options)?;

        // Extra packages duplicate the app's class under their own
        // package name; merged library packages instead get their own
        // (unmangled) symbols back.
        for extra_package in &self.options.extra_java_packages {
            if !self.merged_packages.contains(extra_package) {
                self.write_r_class(java_dir, actual_package, extra_package, &options)?;
            }
        }
        for merged_package in &self.merged_packages {
            self.write_r_class(java_dir, merged_package, merged_package, &options)?;
        }
        Ok(())
    }

    fn write_r_class(
        &self,
        java_dir: &Path,
        package_to_generate: &str,
        out_package: &str,
        options: &JavaClassGeneratorOptions,
    ) -> Result<()> {
        let contents =
            generate_r_class(&self.final_table, package_to_generate, out_package, options)?;
        let out_path = util_fs::package_to_path(java_dir, out_package).join("R.java");
        util_fs::write_string(&out_path, &contents)
    }

    /// Run the whole pipeline.
    pub fn run(&mut self, input_files: &[String]) -> Result<()> {
        // Phase 1: manifest surface.
        let Some(mut manifest_xml) = self.load_xml(&self.options.manifest_path.clone()) else {
            bail!("failed to load manifest");
        };

        if let Some(app_info) = extract_app_info(&manifest_xml, &self.ctx.diag) {
            self.ctx.compilation_package = app_info.package;
        }

        if !fix_manifest(
            &mut manifest_xml,
            &self.options.manifest_fixer_options,
            &self.ctx.diag,
        ) {
            bail!("failed to fix manifest");
        }

        let Some(app_info) = extract_app_info(&manifest_xml, &self.ctx.diag) else {
            bail!("failed to extract data from AndroidManifest.xml");
        };
        self.ctx.compilation_package = app_info.package.clone();
        if let Some(min_sdk) = app_info.min_sdk_version {
            self.ctx.min_sdk_version = min_sdk;
        }
        self.ctx.mangler = NameMangler::new(NameManglerPolicy::new(
            self.ctx.compilation_package.clone(),
        ));
        self.ctx.package_id =
            if self.ctx.compilation_package == "android" || self.options.legacy_package_id {
                PACKAGE_FRAMEWORK
            } else {
                PACKAGE_APP
            };

        tracing::debug!(
            package = %self.ctx.compilation_package,
            package_id = format_args!("0x{:02x}", self.ctx.package_id),
            min_sdk = self.ctx.min_sdk_version,
            "linking package"
        );

        // Phase 2: symbols from includes.
        if !self.load_symbols_from_include_paths() {
            bail!("failed loading include paths");
        }

        // Phase 3: merge inputs, then overlays.
        for input in input_files {
            if !self.merge_path(input, false) {
                bail!("failed parsing input");
            }
        }
        for overlay in self.options.overlay_files.clone() {
            if !self.merge_path(&overlay, true) {
                bail!("failed parsing overlays");
            }
        }

        if !self.verify_no_external_packages() {
            bail!("defined resources for external packages");
        }

        // Phase 4: IDs.
        if self.options.static_lib {
            if !verify_no_ids(&self.final_table, &self.ctx.diag) {
                bail!("static library has pre-assigned IDs");
            }
        } else {
            move_private_attributes(&mut self.final_table);
            if !assign_ids(
                &mut self.final_table,
                &self.options.stable_id_map,
                &self.ctx.diag,
            ) {
                bail!("failed assigning IDs");
            }
            if let Some(path) = &self.options.emit_id_map_path {
                emit_stable_id_map(path, &self.final_table)?;
            }
        }

        // Phase 5: references. Merged library names become visible to
        // the mangler now.
        let mut policy = NameManglerPolicy::new(self.ctx.compilation_package.clone());
        policy.packages_to_mangle = self.merged_packages.clone();
        self.ctx.mangler = NameMangler::new(policy);

        if !link_table_references(&mut self.final_table, &self.ctx) {
            bail!("failed linking references");
        }

        // Phase 6: value selection and versioning.
        if self.options.static_lib {
            if !self.options.products.is_empty() {
                self.ctx
                    .diag
                    .warn("can't select products when building static library");
            }
        } else {
            let filter = ProductFilter::new(self.options.products.clone());
            if !filter.consume(&mut self.final_table, &self.ctx.diag) {
                bail!("failed stripping products");
            }
        }

        if !self.options.no_auto_version {
            version_styles(&mut self.final_table, self.ctx.min_sdk_version);
        }

        if !self.options.static_lib && self.ctx.min_sdk_version > 0 {
            tracing::debug!(
                min_sdk = self.ctx.min_sdk_version,
                "collapsing resource versions"
            );
            collapse_versions(&mut self.final_table, self.ctx.min_sdk_version);
        }

        let mut keep_set = KeepSet::new();
        let mut main_dex_keep_set = KeepSet::new();

        // Phase 7: splits.
        if self.options.static_lib {
            if self.options.table_splitter_options.config_filter.is_some()
                || self
                    .options
                    .table_splitter_options
                    .preferred_density
                    .is_some()
            {
                self.ctx
                    .diag
                    .warn("can't strip resources when building static library");
            }
        } else if !self.options.split_constraints.is_empty()
            || self.options.table_splitter_options.config_filter.is_some()
            || self
                .options
                .table_splitter_options
                .preferred_density
                .is_some()
        {
            let adjusted = adjust_split_constraints(
                &self.options.split_constraints,
                self.ctx.min_sdk_version,
            );
            let mut splitter =
                TableSplitter::new(adjusted.clone(), self.options.table_splitter_options.clone());
            if !splitter.verify_split_constraints(&self.ctx.diag) {
                bail!("overlapping split constraints");
            }
            splitter.split_table(&mut self.final_table);

            let split_paths = self.options.split_paths.clone();
            for ((mut split_table, constraints), path) in splitter
                .into_splits()
                .into_iter()
                .zip(adjusted)
                .zip(&split_paths)
            {
                tracing::debug!(
                    path = %path.display(),
                    split = %constraints.name(),
                    "generating split"
                );
                let mut writer = self.make_archive_writer(path)?;

                let mut split_manifest = generate_split_manifest(&app_info, &constraints);
                let result =
                    link_xml_references(&mut split_manifest, &self.final_table, &self.ctx);
                if !result.success {
                    bail!("failed to create split AndroidManifest.xml");
                }

                self.write_apk(
                    writer.as_mut(),
                    &mut keep_set,
                    &split_manifest,
                    &mut split_table,
                )?;
                writer.finish()?;
            }
        }

        // Phase 8: the base archive.
        // The manifest sees local resources through the app package.
        manifest_xml.name.package = self.ctx.compilation_package.clone();
        let result = link_xml_references(&mut manifest_xml, &self.final_table, &self.ctx);
        if !result.success {
            bail!("failed processing manifest");
        }

        if self.options.generate_proguard_rules_path.is_some() {
            collect_manifest_rules(
                &Source::new(&self.options.manifest_path),
                &manifest_xml,
                &self.ctx.compilation_package,
                &mut keep_set,
                false,
            );
        }
        if self.options.generate_main_dex_proguard_rules_path.is_some() {
            collect_manifest_rules(
                &Source::new(&self.options.manifest_path),
                &manifest_xml,
                &self.ctx.compilation_package,
                &mut main_dex_keep_set,
                true,
            );
        }

        if let Some(java_dir) = &self.options.generate_java_class_path {
            if let Some(contents) =
                generate_manifest_class(&manifest_xml, &self.ctx.compilation_package)
            {
                let out_path =
                    util_fs::package_to_path(java_dir, &self.ctx.compilation_package)
                        .join("Manifest.java");
                util_fs::write_string(&out_path, &contents)?;
            }
        }

        if self.options.no_xml_namespaces {
            // Keep URIs; the platform's package parser needs them.
            xml::remove_namespaces(&mut manifest_xml.root, true);
        }

        let output_path = self.options.output_path.clone();
        let mut writer = self.make_archive_writer(&output_path)?;
        let mut final_table = std::mem::take(&mut self.final_table);
        self.write_apk(writer.as_mut(), &mut keep_set, &manifest_xml, &mut final_table)?;
        self.final_table = final_table;
        writer.finish()?;

        // Phase 9: generated sources and keep rules.
        self.write_r_classes(&app_info)?;

        if let Some(path) = &self.options.generate_proguard_rules_path {
            keep_set.write_to(path)?;
        }
        if let Some(path) = &self.options.generate_main_dex_proguard_rules_path {
            main_dex_keep_set.write_to(path)?;
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            self.dump_table();
        }
        Ok(())
    }

    fn dump_table(&self) {
        for package in &self.final_table.packages {
            tracing::debug!(package = %package.name, id = ?package.id, "package");
            for group in &package.types {
                tracing::debug!(ty = %group.ty, id = ?group.id, "  type");
                for entry in &group.entries {
                    for cv in &entry.values {
                        tracing::debug!(
                            entry = %entry.name,
                            id = ?entry.id,
                            config = %cv.config,
                            value = %binary::render_value(&cv.value),
                            source = %cv.value.source,
                            "    entry"
                        );
                    }
                }
            }
        }
    }
}

/// `-z` is accepted for compatibility; string localization checking is
/// not performed.
pub fn warn_require_localization(diag: &crate::util::Diagnostics) {
    diag.warn("string localization checking (-z) is not supported; ignoring");
}
