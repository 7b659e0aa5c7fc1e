//! Manifest handling: app info extraction, surface fixing, and split
//! manifest synthesis.

use crate::codec::xml::{Attribute, Element, Node, XmlResource, SCHEMA_ANDROID};
use crate::core::value::Source;
use crate::link::split::SplitConstraints;
use crate::util::Diagnostics;

/// The facts the driver needs out of `AndroidManifest.xml`.
#[derive(Debug, Clone, Default)]
pub struct AppInfo {
    pub package: String,
    pub version_code: Option<u32>,
    pub revision_code: Option<u32>,
    pub min_sdk_version: Option<u16>,
}

/// Pull package, version codes, and minSdkVersion from a manifest.
pub fn extract_app_info(doc: &XmlResource, diag: &Diagnostics) -> Option<AppInfo> {
    let root = &doc.root;
    if !root.namespace_uri.is_empty() || root.name != "manifest" {
        diag.error_at(&doc.source, "root tag must be <manifest>");
        return None;
    }

    let Some(package) = root.find_attribute("", "package") else {
        diag.error_at(&doc.source, "<manifest> must have a 'package' attribute");
        return None;
    };

    let mut app_info = AppInfo {
        package: package.value.clone(),
        ..AppInfo::default()
    };

    if let Some(attr) = root.find_attribute(SCHEMA_ANDROID, "versionCode") {
        match attr.value.parse::<u32>() {
            Ok(code) => app_info.version_code = Some(code),
            Err(_) => {
                diag.error_at(
                    &doc.source.with_line(root.line),
                    format!("invalid android:versionCode '{}'", attr.value),
                );
                return None;
            }
        }
    }

    if let Some(attr) = root.find_attribute(SCHEMA_ANDROID, "revisionCode") {
        match attr.value.parse::<u32>() {
            Ok(code) => app_info.revision_code = Some(code),
            Err(_) => {
                diag.error_at(
                    &doc.source.with_line(root.line),
                    format!("invalid android:revisionCode '{}'", attr.value),
                );
                return None;
            }
        }
    }

    if let Some(uses_sdk) = root.find_child("", "uses-sdk") {
        if let Some(min_sdk) = uses_sdk.find_attribute(SCHEMA_ANDROID, "minSdkVersion") {
            // Codename values are passed through unversioned.
            app_info.min_sdk_version = min_sdk.value.parse::<u16>().ok();
        }
    }

    Some(app_info)
}

/// Defaults injected and renames applied before linking.
#[derive(Debug, Clone, Default)]
pub struct ManifestFixerOptions {
    pub min_sdk_version_default: Option<String>,
    pub target_sdk_version_default: Option<String>,
    pub version_code_default: Option<String>,
    pub version_name_default: Option<String>,
    pub rename_manifest_package: Option<String>,
    pub rename_instrumentation_target_package: Option<String>,
}

fn set_attribute_if_absent(element: &mut Element, namespace_uri: &str, name: &str, value: &str) {
    if element.find_attribute(namespace_uri, name).is_none() {
        element.attributes.push(Attribute {
            namespace_uri: namespace_uri.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            compiled_value: None,
            sdk_level: 0,
        });
    }
}

fn set_attribute(element: &mut Element, namespace_uri: &str, name: &str, value: &str) {
    match element
        .attributes
        .iter_mut()
        .find(|a| a.namespace_uri == namespace_uri && a.name == name)
    {
        Some(attr) => attr.value = value.to_string(),
        None => element.attributes.push(Attribute {
            namespace_uri: namespace_uri.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            compiled_value: None,
            sdk_level: 0,
        }),
    }
}

/// Fix the manifest surface: inject version and SDK defaults, apply
/// package renames.
pub fn fix_manifest(
    doc: &mut XmlResource,
    options: &ManifestFixerOptions,
    diag: &Diagnostics,
) -> bool {
    if doc.root.name != "manifest" || !doc.root.namespace_uri.is_empty() {
        diag.error_at(&doc.source, "root tag must be <manifest>");
        return false;
    }

    if let Some(version_code) = &options.version_code_default {
        set_attribute_if_absent(&mut doc.root, SCHEMA_ANDROID, "versionCode", version_code);
    }
    if let Some(version_name) = &options.version_name_default {
        set_attribute_if_absent(&mut doc.root, SCHEMA_ANDROID, "versionName", version_name);
    }

    let needs_uses_sdk = options.min_sdk_version_default.is_some()
        || options.target_sdk_version_default.is_some();
    if needs_uses_sdk && doc.root.find_child("", "uses-sdk").is_none() {
        doc.root.children.insert(
            0,
            Node::Element(Element {
                name: "uses-sdk".to_string(),
                ..Element::default()
            }),
        );
    }
    if needs_uses_sdk {
        for child in doc.root.child_elements_mut() {
            if child.name != "uses-sdk" || !child.namespace_uri.is_empty() {
                continue;
            }
            if let Some(min_sdk) = &options.min_sdk_version_default {
                set_attribute_if_absent(child, SCHEMA_ANDROID, "minSdkVersion", min_sdk);
            }
            if let Some(target_sdk) = &options.target_sdk_version_default {
                set_attribute_if_absent(child, SCHEMA_ANDROID, "targetSdkVersion", target_sdk);
            }
        }
    }

    if let Some(new_package) = &options.rename_manifest_package {
        set_attribute(&mut doc.root, "", "package", new_package);
    }

    if let Some(new_target) = &options.rename_instrumentation_target_package {
        for child in doc.root.child_elements_mut() {
            if child.name == "instrumentation" && child.namespace_uri.is_empty() {
                set_attribute(child, SCHEMA_ANDROID, "targetPackage", new_target);
            }
        }
    }

    true
}

/// Build the minimal manifest of a configuration split.
pub fn generate_split_manifest(app_info: &AppInfo, constraints: &SplitConstraints) -> XmlResource {
    let mut manifest = Element {
        name: "manifest".to_string(),
        namespace_decls: vec![("android".to_string(), SCHEMA_ANDROID.to_string())],
        line: 1,
        ..Element::default()
    };

    set_attribute(&mut manifest, "", "package", &app_info.package);
    if let Some(version_code) = app_info.version_code {
        set_attribute(
            &mut manifest,
            SCHEMA_ANDROID,
            "versionCode",
            &version_code.to_string(),
        );
    }
    if let Some(revision_code) = app_info.revision_code {
        set_attribute(
            &mut manifest,
            SCHEMA_ANDROID,
            "revisionCode",
            &revision_code.to_string(),
        );
    }
    set_attribute(&mut manifest, "", "split", &constraints.name());

    let mut application = Element {
        name: "application".to_string(),
        ..Element::default()
    };
    set_attribute(&mut application, SCHEMA_ANDROID, "hasCode", "false");
    manifest.children.push(Node::Element(application));

    XmlResource::new(Source::new("generated/AndroidManifest.xml"), manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::xml::{flatten, inflate, FlattenOptions};
    use crate::core::config::ConfigDescription;

    const MANIFEST: &str = r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android"
    package="com.x" android:versionCode="7">
    <uses-sdk android:minSdkVersion="21" />
    <application android:name=".App" />
</manifest>"#;

    fn inflate_manifest(xml: &str) -> XmlResource {
        let diag = Diagnostics::capturing();
        inflate(xml.as_bytes(), &Source::new("AndroidManifest.xml"), &diag).unwrap()
    }

    #[test]
    fn test_extract_app_info() {
        let diag = Diagnostics::capturing();
        let info = extract_app_info(&inflate_manifest(MANIFEST), &diag).unwrap();
        assert_eq!(info.package, "com.x");
        assert_eq!(info.version_code, Some(7));
        assert_eq!(info.min_sdk_version, Some(21));
    }

    #[test]
    fn test_extract_requires_manifest_root() {
        let diag = Diagnostics::capturing();
        let doc = inflate_manifest("<application package=\"com.x\" />");
        assert!(extract_app_info(&doc, &diag).is_none());
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_extract_requires_package() {
        let diag = Diagnostics::capturing();
        let doc = inflate_manifest("<manifest />");
        assert!(extract_app_info(&doc, &diag).is_none());
    }

    #[test]
    fn test_fixer_injects_defaults() {
        let diag = Diagnostics::capturing();
        let mut doc = inflate_manifest("<manifest package=\"com.x\" xmlns:android=\"http://schemas.android.com/apk/res/android\" />");
        let options = ManifestFixerOptions {
            min_sdk_version_default: Some("19".to_string()),
            target_sdk_version_default: Some("25".to_string()),
            version_code_default: Some("1".to_string()),
            ..ManifestFixerOptions::default()
        };
        assert!(fix_manifest(&mut doc, &options, &diag));

        let info = extract_app_info(&doc, &diag).unwrap();
        assert_eq!(info.min_sdk_version, Some(19));
        assert_eq!(info.version_code, Some(1));
    }

    #[test]
    fn test_fixer_keeps_existing_values() {
        let diag = Diagnostics::capturing();
        let mut doc = inflate_manifest(MANIFEST);
        let options = ManifestFixerOptions {
            min_sdk_version_default: Some("4".to_string()),
            version_code_default: Some("99".to_string()),
            ..ManifestFixerOptions::default()
        };
        assert!(fix_manifest(&mut doc, &options, &diag));

        let info = extract_app_info(&doc, &diag).unwrap();
        assert_eq!(info.min_sdk_version, Some(21));
        assert_eq!(info.version_code, Some(7));
    }

    #[test]
    fn test_fixer_renames_package() {
        let diag = Diagnostics::capturing();
        let mut doc = inflate_manifest(MANIFEST);
        let options = ManifestFixerOptions {
            rename_manifest_package: Some("com.y".to_string()),
            ..ManifestFixerOptions::default()
        };
        assert!(fix_manifest(&mut doc, &options, &diag));
        assert_eq!(extract_app_info(&doc, &diag).unwrap().package, "com.y");
    }

    #[test]
    fn test_split_manifest() {
        let app_info = AppInfo {
            package: "com.x".to_string(),
            version_code: Some(3),
            ..AppInfo::default()
        };
        let constraints = SplitConstraints {
            configs: [ConfigDescription::parse("hdpi").unwrap()].into(),
        };
        let doc = generate_split_manifest(&app_info, &constraints);

        let xml = String::from_utf8(flatten(&doc, &FlattenOptions::default()).unwrap()).unwrap();
        assert!(xml.contains("split=\"config.hdpi\""));
        assert!(xml.contains("package=\"com.x\""));
        assert!(xml.contains("android:hasCode=\"false\""));
    }
}
