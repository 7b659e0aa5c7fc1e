//! Implementation of `reslink link`.

use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{bail, Result};

use reslink::core::config::ConfigDescription;
use reslink::link::driver::{warn_require_localization, LinkCommand, LinkOptions};
use reslink::link::filter::{is_density_only, AxisConfigFilter};
use reslink::link::ids::load_stable_id_map;
use reslink::link::manifest::ManifestFixerOptions;
use reslink::link::split::SplitConstraints;
use reslink::link::LinkContext;
use reslink::util::fs::expand_arg_files;
use reslink::util::Diagnostics;

use crate::cli::LinkArgs;

/// File extensions that are already compressed.
const DEFAULT_NO_COMPRESS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".wav", ".mp2", ".mp3", ".ogg", ".aac", ".mpg", ".mpeg",
    ".mid", ".midi", ".smf", ".jet", ".rtttl", ".imy", ".xmf", ".mp4", ".m4a", ".m4v", ".3gp",
    ".3gpp", ".3g2", ".3gpp2", ".amr", ".awb", ".wma", ".wmv", ".webm", ".mkv",
];

fn parse_split_parameter(
    arg: &str,
    diag: &Diagnostics,
) -> Option<(PathBuf, SplitConstraints)> {
    let Some((path, configs)) = arg.split_once(':') else {
        diag.error(format!("invalid split parameter '{}'", arg));
        diag.note("should be --split path/to/output.apk:<config>[,<config>...]");
        return None;
    };

    let mut constraints = SplitConstraints::default();
    for config_str in configs.split(',') {
        match ConfigDescription::parse(config_str) {
            Ok(config) => {
                constraints.configs.insert(config);
            }
            Err(_) => {
                diag.error(format!(
                    "invalid config '{}' in split parameter '{}'",
                    config_str, arg
                ));
                return None;
            }
        }
    }
    Some((PathBuf::from(path), constraints))
}

pub fn execute(args: LinkArgs) -> Result<()> {
    let diag = Diagnostics::new(std::io::stderr().is_terminal());

    let mut options = LinkOptions {
        output_path: args.output,
        manifest_path: args.manifest,
        include_paths: args.include,
        generate_java_class_path: args.java,
        generate_proguard_rules_path: args.proguard,
        generate_main_dex_proguard_rules_path: args.proguard_main_dex,
        no_auto_version: args.no_auto_version,
        no_version_vectors: args.no_version_vectors,
        static_lib: args.static_lib,
        no_static_lib_packages: args.no_static_lib_packages,
        generate_non_final_ids: args.non_final_ids,
        javadoc_annotations: args.add_javadoc_annotation,
        output_to_directory: args.output_to_dir,
        no_xml_namespaces: args.no_xml_namespaces,
        auto_add_overlay: args.auto_add_overlay,
        private_symbols: args.private_symbols,
        custom_java_package: args.custom_package,
        legacy_package_id: args.legacy_package_id,
        manifest_fixer_options: ManifestFixerOptions {
            min_sdk_version_default: args.min_sdk_version,
            target_sdk_version_default: args.target_sdk_version,
            version_code_default: args.version_code,
            version_name_default: args.version_name,
            rename_manifest_package: args.rename_manifest_package,
            rename_instrumentation_target_package: args.rename_instrumentation_target_package,
        },
        ..LinkOptions::default()
    };

    if args.require_localization {
        warn_require_localization(&diag);
    }

    // Expand @argument-files in the inputs and in -R.
    let inputs = expand_arg_files(args.inputs)?;
    options.overlay_files = expand_arg_files(args.overlay)?;

    // A package argument can be a colon separated list of packages.
    for extra_package in args.extra_packages {
        for package in extra_package.split(':').filter(|p| !p.is_empty()) {
            options.extra_java_packages.insert(package.to_string());
        }
    }

    if let Some(product_list) = args.product {
        for product in product_list.split(',') {
            if !product.is_empty() && product != "default" {
                options.products.insert(product.to_string());
            }
        }
    }

    if let Some(config_list) = args.configs {
        let mut filter = AxisConfigFilter::new();
        for config_str in config_list.split(',') {
            let config = match ConfigDescription::parse(config_str) {
                Ok(config) => config,
                Err(_) => {
                    diag.error(format!("invalid config '{}' for -c option", config_str));
                    bail!("invalid -c option");
                }
            };
            if config.density != 0 {
                diag.warn(format!("ignoring density '{}' for -c option", config));
            } else {
                filter.add_config(config);
            }
        }
        if !filter.is_empty() {
            options.table_splitter_options.config_filter = Some(filter);
        }
    }

    if let Some(density_str) = &args.preferred_density {
        let mut config = match ConfigDescription::parse(density_str) {
            Ok(config) => config,
            Err(_) => {
                diag.error(format!(
                    "invalid density '{}' for --preferred-density option",
                    density_str
                ));
                bail!("invalid --preferred-density option");
            }
        };
        // The version qualifier is added automatically elsewhere.
        config.sdk_version = 0;
        if !is_density_only(&config) {
            diag.error(format!(
                "invalid preferred density '{}'. Preferred density must only be a density value",
                density_str
            ));
            bail!("invalid --preferred-density option");
        }
        options.table_splitter_options.preferred_density = Some(config.density);
    }

    if !options.static_lib {
        if let Some(path) = &args.stable_ids {
            match load_stable_id_map(path, &diag) {
                Some(map) => options.stable_id_map = map,
                None => bail!("failed loading stable ID file"),
            }
        }
    }
    options.emit_id_map_path = args.emit_ids;

    let mut no_compress: BTreeSet<String> =
        DEFAULT_NO_COMPRESS.iter().map(|s| s.to_string()).collect();
    no_compress.extend(args.no_compress);
    options.extensions_to_not_compress = no_compress;

    for split_arg in &args.split {
        let Some((path, constraints)) = parse_split_parameter(split_arg, &diag) else {
            bail!("invalid --split option");
        };
        options.split_paths.push(path);
        options.split_constraints.push(constraints);
    }

    // Static libraries are merged into apps later; versioning happens
    // there.
    if options.static_lib {
        options.no_auto_version = true;
        options.no_version_vectors = true;
    }

    let ctx = LinkContext::new(diag);
    let mut command = LinkCommand::new(options, ctx);
    command.run(&inputs)
}
