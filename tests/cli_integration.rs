//! CLI integration tests for reslink.
//!
//! These tests build real compiled inputs, run the full link pipeline
//! through the binary, and inspect the produced archives.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

use reslink::codec::binary::{parse_table, BinaryEntry};
use reslink::codec::compiled::{write_bundle, CompiledFileHeader};
use reslink::codec::table::serialize_table;
use reslink::core::config::ConfigDescription;
use reslink::core::name::ResourceName;
use reslink::core::value::{parse_item, Source, Value};
use reslink::core::ResourceTable;
use reslink::util::Diagnostics;

/// Get the reslink binary command.
fn reslink() -> Command {
    Command::cargo_bin("reslink").unwrap()
}

fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn write_manifest(dir: &Path, package: &str, min_sdk: Option<u16>) -> PathBuf {
    let path = dir.join("AndroidManifest.xml");
    let uses_sdk = match min_sdk {
        Some(v) => format!("<uses-sdk android:minSdkVersion=\"{}\" />", v),
        None => String::new(),
    };
    fs::write(
        &path,
        format!(
            "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\" package=\"{}\">{}</manifest>",
            package, uses_sdk
        ),
    )
    .unwrap();
    path
}

/// Serialize a table of simple values as a `.arsc.flat` input.
fn write_values(dir: &Path, file_name: &str, package: &str, values: &[(&str, &str)]) -> PathBuf {
    let diag = Diagnostics::capturing();
    let mut table = ResourceTable::new();
    for (name, value) in values {
        let name = ResourceName::parse(&format!("{}:{}", package, name)).unwrap();
        assert!(table.add_resource(
            &name,
            &ConfigDescription::default(),
            "",
            Value::item(Source::new("res/values/values.xml"), parse_item(value)),
            &diag,
        ));
    }
    let path = dir.join(file_name);
    fs::write(&path, serialize_table(&table).unwrap()).unwrap();
    path
}

/// Bundle files as a compiled `.flat` input.
fn write_compiled_files(
    dir: &Path,
    file_name: &str,
    files: &[(&str, &str, &[u8])],
) -> PathBuf {
    let bundle: Vec<(CompiledFileHeader, Vec<u8>)> = files
        .iter()
        .map(|(name, config, payload)| {
            let res = ResourceName::parse(name).unwrap();
            let qualifier = if *config == "default" {
                String::new()
            } else {
                format!("-{}", config)
            };
            (
                CompiledFileHeader {
                    name: name.to_string(),
                    config: config.to_string(),
                    source_path: format!(
                        "res/{}{}/{}.png",
                        res.ty, qualifier, res.entry
                    ),
                    exported_symbols: Vec::new(),
                },
                payload.to_vec(),
            )
        })
        .collect();
    let path = dir.join(file_name);
    fs::write(&path, write_bundle(&bundle).unwrap()).unwrap();
    path
}

fn archive_names(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    archive.file_names().map(str::to_string).collect()
}

fn read_entry(path: &Path, name: &str) -> Vec<u8> {
    use std::io::Read;
    let mut archive = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    data
}

fn read_resource_table(path: &Path) -> Vec<BinaryEntry> {
    parse_table(&read_entry(path, "resources.arsc")).unwrap()
}

// ============================================================================
// basic linking
// ============================================================================

#[test]
fn test_trivial_app() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", Some(21));
    let values = write_values(tmp.path(), "values.arsc.flat", "com.x", &[("string/app_name", "Hi")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .success();

    let names = archive_names(&out);
    assert!(names.contains(&"AndroidManifest.xml".to_string()));
    assert!(names.contains(&"resources.arsc".to_string()));

    let entries = read_resource_table(&out);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id.0, 0x7f010000);
    assert_eq!(entries[0].name.to_string(), "com.x:string/app_name");
    assert_eq!(entries[0].value, "Hi");
}

#[test]
fn test_missing_manifest_fails() {
    let tmp = temp_dir();
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(tmp.path().join("nope.xml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_output_to_directory() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(tmp.path(), "values.arsc.flat", "com.x", &[("string/s", "v")]);
    let out = tmp.path().join("apk");

    reslink()
        .args(["link", "--output-to-dir", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .success();

    assert!(out.join("AndroidManifest.xml").exists());
    assert!(out.join("resources.arsc").exists());
}

// ============================================================================
// overlays
// ============================================================================

#[test]
fn test_overlay_wins() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let base = write_values(tmp.path(), "base.arsc.flat", "com.x", &[("string/s", "A")]);
    let overlay = write_values(tmp.path(), "overlay.arsc.flat", "com.x", &[("string/s", "B")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("-R")
        .arg(&overlay)
        .arg(&base)
        .assert()
        .success();

    let entries = read_resource_table(&out);
    assert_eq!(entries[0].value, "B");
}

#[test]
fn test_conflict_without_overlay_fails() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let a = write_values(tmp.path(), "a.arsc.flat", "com.x", &[("string/s", "A")]);
    let b = write_values(tmp.path(), "b.arsc.flat", "com.x", &[("string/s", "B")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate value"));
}

#[test]
fn test_new_resource_in_overlay_needs_auto_add() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let base = write_values(tmp.path(), "base.arsc.flat", "com.x", &[("string/s", "A")]);
    let overlay = write_values(tmp.path(), "overlay.arsc.flat", "com.x", &[("string/extra", "E")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("-R")
        .arg(&overlay)
        .arg(&base)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not override"));

    reslink()
        .args(["link", "--auto-add-overlay", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("-R")
        .arg(&overlay)
        .arg(&base)
        .assert()
        .success();
}

#[test]
fn test_overlay_argument_file_expansion() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let base = write_values(tmp.path(), "base.arsc.flat", "com.x", &[("string/s", "A")]);
    let overlay = write_values(tmp.path(), "overlay.arsc.flat", "com.x", &[("string/s", "B")]);

    let arg_file = tmp.path().join("overlays.txt");
    fs::write(&arg_file, format!("{}\n", overlay.display())).unwrap();
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("-R")
        .arg(format!("@{}", arg_file.display()))
        .arg(&base)
        .assert()
        .success();

    let entries = read_resource_table(&out);
    assert_eq!(entries[0].value, "B");
}

// ============================================================================
// reference resolution
// ============================================================================

#[test]
fn test_unresolved_reference_fails_with_source() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(
        tmp.path(),
        "values.arsc.flat",
        "com.x",
        &[("string/alias", "@string/missing")],
    );
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .failure()
        .stderr(predicate::str::contains("string/missing"))
        .stderr(predicate::str::contains("res/values/values.xml"));
}

#[test]
fn test_reference_resolves_to_id() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(
        tmp.path(),
        "values.arsc.flat",
        "com.x",
        &[("string/target", "T"), ("string/alias", "@string/target")],
    );
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .success();

    let entries = read_resource_table(&out);
    let alias = entries
        .iter()
        .find(|e| e.name.entry == "alias")
        .unwrap();
    let target = entries
        .iter()
        .find(|e| e.name.entry == "target")
        .unwrap();
    assert_eq!(alias.value, format!("@{}", target.id));
}

// ============================================================================
// files and splits
// ============================================================================

#[test]
fn test_split_by_density() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let drawables = write_compiled_files(
        tmp.path(),
        "drawables.flat",
        &[
            ("com.x:drawable/icon", "hdpi", b"HDPI"),
            ("com.x:drawable/icon", "xhdpi", b"XHDPI"),
            ("com.x:drawable/icon", "xxhdpi", b"XXHDPI"),
        ],
    );
    let out = tmp.path().join("out.apk");
    let out_hdpi = tmp.path().join("out-hdpi.apk");
    let out_xhdpi = tmp.path().join("out-xhdpi.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--split")
        .arg(format!("{}:hdpi", out_hdpi.display()))
        .arg("--split")
        .arg(format!("{}:xhdpi", out_xhdpi.display()))
        .arg(&drawables)
        .assert()
        .success();

    // The base keeps only the unclaimed density.
    let base_names = archive_names(&out);
    assert!(base_names.contains(&"res/drawable-xxhdpi/icon.png".to_string()));
    assert!(!base_names.contains(&"res/drawable-hdpi/icon.png".to_string()));
    assert!(!base_names.contains(&"res/drawable-xhdpi/icon.png".to_string()));

    let hdpi_names = archive_names(&out_hdpi);
    assert!(hdpi_names.contains(&"res/drawable-hdpi/icon.png".to_string()));
    assert!(!hdpi_names.contains(&"res/drawable-xhdpi/icon.png".to_string()));
    assert_eq!(read_entry(&out_hdpi, "res/drawable-hdpi/icon.png"), b"HDPI");

    let split_manifest = String::from_utf8(read_entry(&out_hdpi, "AndroidManifest.xml")).unwrap();
    assert!(split_manifest.contains("split=\"config.hdpi\""));

    let xhdpi_manifest = String::from_utf8(read_entry(&out_xhdpi, "AndroidManifest.xml")).unwrap();
    assert!(xhdpi_manifest.contains("split=\"config.xhdpi\""));
}

#[test]
fn test_overlapping_splits_fail() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(tmp.path(), "v.arsc.flat", "com.x", &[("string/s", "v")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--split")
        .arg(format!("{}:hdpi", tmp.path().join("a.apk").display()))
        .arg("--split")
        .arg(format!("{}:hdpi,xhdpi", tmp.path().join("b.apk").display()))
        .arg(&values)
        .assert()
        .failure()
        .stderr(predicate::str::contains("overlap"));
}

#[test]
fn test_archive_entries_sorted_by_config_and_name() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let drawables = write_compiled_files(
        tmp.path(),
        "drawables.flat",
        &[
            ("com.x:drawable/zebra", "default", b"Z"),
            ("com.x:drawable/apple", "hdpi", b"AH"),
            ("com.x:drawable/apple", "default", b"A"),
        ],
    );
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&drawables)
        .assert()
        .success();

    let names: Vec<String> = archive_names(&out)
        .into_iter()
        .filter(|n| n.starts_with("res/"))
        .collect();
    assert_eq!(
        names,
        [
            "res/drawable/apple.png",
            "res/drawable/zebra.png",
            "res/drawable-hdpi/apple.png",
        ]
    );
}

// ============================================================================
// stable IDs
// ============================================================================

#[test]
fn test_stable_ids_pin_assignments() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(
        tmp.path(),
        "values.arsc.flat",
        "com.x",
        &[("string/app_name", "Hi"), ("string/other", "O")],
    );
    let stable = tmp.path().join("stable.txt");
    fs::write(&stable, "com.x:string/app_name = 0x7f010042\n").unwrap();
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--stable-ids")
        .arg(&stable)
        .arg(&values)
        .assert()
        .success();

    let entries = read_resource_table(&out);
    let pinned = entries.iter().find(|e| e.name.entry == "app_name").unwrap();
    assert_eq!(pinned.id.0, 0x7f010042);
}

#[test]
fn test_emitted_ids_reproduce_assignment() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(
        tmp.path(),
        "values.arsc.flat",
        "com.x",
        &[("string/a", "A"), ("string/b", "B"), ("layout/ignored_name", "x")],
    );
    let emitted = tmp.path().join("emitted.txt");
    let out1 = tmp.path().join("out1.apk");
    let out2 = tmp.path().join("out2.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out1)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--emit-ids")
        .arg(&emitted)
        .arg(&values)
        .assert()
        .success();

    reslink()
        .args(["link", "-o"])
        .arg(&out2)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--stable-ids")
        .arg(&emitted)
        .arg(&values)
        .assert()
        .success();

    let ids1: Vec<(String, u32)> = read_resource_table(&out1)
        .iter()
        .map(|e| (e.name.to_string(), e.id.0))
        .collect();
    let ids2: Vec<(String, u32)> = read_resource_table(&out2)
        .iter()
        .map(|e| (e.name.to_string(), e.id.0))
        .collect();
    assert_eq!(ids1, ids2);
}

#[test]
fn test_malformed_stable_id_file_fails() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(tmp.path(), "v.arsc.flat", "com.x", &[("string/s", "v")]);
    let stable = tmp.path().join("stable.txt");
    fs::write(&stable, "com.x:string/s 0x7f010000\n").unwrap();
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--stable-ids")
        .arg(&stable)
        .arg(&values)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing '='"));
}

// ============================================================================
// determinism
// ============================================================================

#[test]
fn test_link_is_deterministic() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", Some(19));
    let values = write_values(
        tmp.path(),
        "values.arsc.flat",
        "com.x",
        &[("string/b", "B"), ("string/a", "A"), ("color/c", "#ff112233")],
    );
    let out1 = tmp.path().join("out1.apk");
    let out2 = tmp.path().join("out2.apk");

    for out in [&out1, &out2] {
        reslink()
            .args(["link", "-o"])
            .arg(out)
            .arg("--manifest")
            .arg(&manifest)
            .arg(&values)
            .assert()
            .success();
    }

    assert_eq!(
        read_entry(&out1, "resources.arsc"),
        read_entry(&out2, "resources.arsc")
    );
}

// ============================================================================
// generated outputs
// ============================================================================

#[test]
fn test_r_java_generation() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(tmp.path(), "v.arsc.flat", "com.x", &[("string/app_name", "Hi")]);
    let gen_dir = tmp.path().join("gen");
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg("--java")
        .arg(&gen_dir)
        .arg("--extra-packages")
        .arg("com.extra:com.other")
        .arg(&values)
        .assert()
        .success();

    let r_java = fs::read_to_string(gen_dir.join("com/x/R.java")).unwrap();
    assert!(r_java.contains("package com.x;"));
    assert!(r_java.contains("public static final int app_name = 0x7f010000;"));

    // Extra packages get the same class under their own package name.
    let extra = fs::read_to_string(gen_dir.join("com/extra/R.java")).unwrap();
    assert!(extra.contains("package com.extra;"));
    assert!(extra.contains("app_name"));
    assert!(gen_dir.join("com/other/R.java").exists());
}

#[test]
fn test_proguard_rules_from_manifest() {
    let tmp = temp_dir();
    let manifest_path = tmp.path().join("AndroidManifest.xml");
    fs::write(
        &manifest_path,
        r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.x">
    <application android:name=".App">
        <activity android:name=".MainActivity" />
    </application>
</manifest>"#,
    )
    .unwrap();
    let values = write_values(tmp.path(), "v.arsc.flat", "com.x", &[("string/s", "v")]);
    let rules = tmp.path().join("rules.pro");
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest_path)
        .arg("--proguard")
        .arg(&rules)
        .arg(&values)
        .assert()
        .success();

    let rules = fs::read_to_string(&rules).unwrap();
    assert!(rules.contains("-keep class com.x.App"));
    assert!(rules.contains("-keep class com.x.MainActivity"));
}

// ============================================================================
// static libraries
// ============================================================================

#[test]
fn test_static_lib_emits_serialized_table() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.lib", None);
    let values = write_values(tmp.path(), "v.arsc.flat", "com.lib", &[("string/title", "T")]);
    let out = tmp.path().join("lib.apk");

    reslink()
        .args(["link", "--static-lib", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .success();

    let names = archive_names(&out);
    assert!(names.contains(&"resources.arsc.flat".to_string()));
    assert!(!names.contains(&"resources.arsc".to_string()));
}

#[test]
fn test_app_links_against_static_lib_with_mangling() {
    let tmp = temp_dir();

    // First build the library.
    let lib_manifest = write_manifest(tmp.path(), "com.lib", None);
    let lib_values = write_values(tmp.path(), "lib.arsc.flat", "com.lib", &[("string/title", "T")]);
    let lib_apk = tmp.path().join("lib.apk");
    reslink()
        .args(["link", "--static-lib", "-o"])
        .arg(&lib_apk)
        .arg("--manifest")
        .arg(&lib_manifest)
        .arg(&lib_values)
        .assert()
        .success();

    // Then link an app that references the library resource.
    let app_manifest = write_manifest(tmp.path(), "com.app", None);
    let app_values = write_values(
        tmp.path(),
        "app.arsc.flat",
        "com.app",
        &[("string/alias", "@com.lib:string/title")],
    );
    let out = tmp.path().join("app.apk");
    reslink()
        .args(["link", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&app_manifest)
        .arg(&app_values)
        .arg(&lib_apk)
        .assert()
        .success();

    let entries = read_resource_table(&out);
    let mangled = entries
        .iter()
        .find(|e| e.name.entry == "com_lib$title")
        .unwrap();
    assert_eq!(mangled.value, "T");

    let alias = entries.iter().find(|e| e.name.entry == "alias").unwrap();
    assert_eq!(alias.value, format!("@{}", mangled.id));
}

// ============================================================================
// legacy flags
// ============================================================================

#[test]
fn test_legacy_x_flag_forces_framework_package_id() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(tmp.path(), "v.arsc.flat", "com.x", &[("string/s", "v")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-x", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .success();

    let entries = read_resource_table(&out);
    assert_eq!(entries[0].id.package_id(), 0x01);
}

#[test]
fn test_z_flag_warns_and_continues() {
    let tmp = temp_dir();
    let manifest = write_manifest(tmp.path(), "com.x", None);
    let values = write_values(tmp.path(), "v.arsc.flat", "com.x", &[("string/s", "v")]);
    let out = tmp.path().join("out.apk");

    reslink()
        .args(["link", "-z", "-o"])
        .arg(&out)
        .arg("--manifest")
        .arg(&manifest)
        .arg(&values)
        .assert()
        .success()
        .stderr(predicate::str::contains("warning"));
}
