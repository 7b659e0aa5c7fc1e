//! Shrinker keep rules.
//!
//! A write-only set accumulated while linking the manifest and XML
//! files, serialized once at the end of the link.

use std::collections::BTreeSet;
use std::path::Path;

use crate::codec::xml::{Element, XmlResource, SCHEMA_ANDROID};
use crate::core::value::Source;

/// Accumulated keep obligations.
#[derive(Debug, Default)]
pub struct KeepSet {
    /// Classes referenced by name (manifest components, custom views).
    classes: BTreeSet<(String, String)>,
    /// Classes whose view constructors must survive.
    view_constructors: BTreeSet<(String, String)>,
}

impl KeepSet {
    pub fn new() -> Self {
        KeepSet::default()
    }

    pub fn add_class(&mut self, source: &Source, class: impl Into<String>) {
        self.classes.insert((class.into(), source.to_string()));
    }

    pub fn add_view_constructor(&mut self, source: &Source, class: impl Into<String>) {
        self.view_constructors
            .insert((class.into(), source.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.view_constructors.is_empty()
    }

    /// Render the rule file.
    pub fn to_rules(&self) -> String {
        let mut out = String::new();
        for (class, source) in &self.classes {
            out.push_str(&format!("# Referenced at {}\n", source));
            out.push_str(&format!("-keep class {} {{ <init>(...); }}\n", class));
        }
        for (class, source) in &self.view_constructors {
            out.push_str(&format!("# Referenced at {}\n", source));
            out.push_str(&format!(
                "-keep class {} {{ <init>(android.content.Context, android.util.AttributeSet); }}\n",
                class
            ));
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        crate::util::fs::write_string(path, &self.to_rules())
    }
}

/// Expand a possibly-relative class name against the app package.
fn fully_qualify(package: &str, class: &str) -> String {
    if let Some(rest) = class.strip_prefix('.') {
        format!("{}.{}", package, rest)
    } else if class.contains('.') {
        class.to_string()
    } else {
        format!("{}.{}", package, class)
    }
}

const MANIFEST_COMPONENTS: &[&str] = &[
    "application",
    "activity",
    "activity-alias",
    "service",
    "receiver",
    "provider",
    "instrumentation",
];

/// Collect keep rules from the manifest: component classes, backup
/// agents, and instrumentation runners. With `main_dex_only`, only
/// components that must live in the main dex are collected.
pub fn collect_manifest_rules(
    source: &Source,
    doc: &XmlResource,
    package: &str,
    keep_set: &mut KeepSet,
    main_dex_only: bool,
) {
    collect_manifest_element(source, &doc.root, package, keep_set, main_dex_only);
}

fn collect_manifest_element(
    source: &Source,
    element: &Element,
    package: &str,
    keep_set: &mut KeepSet,
    main_dex_only: bool,
) {
    if element.namespace_uri.is_empty() && MANIFEST_COMPONENTS.contains(&element.name.as_str()) {
        let direct_boot_aware = element
            .find_attribute(SCHEMA_ANDROID, "directBootAware")
            .map(|a| a.value == "true")
            .unwrap_or(false);
        let wanted = !main_dex_only || element.name == "application" || direct_boot_aware;

        if wanted {
            if let Some(name) = element.find_attribute(SCHEMA_ANDROID, "name") {
                keep_set.add_class(
                    &source.with_line(element.line),
                    fully_qualify(package, &name.value),
                );
            }
            if let Some(agent) = element.find_attribute(SCHEMA_ANDROID, "backupAgent") {
                keep_set.add_class(
                    &source.with_line(element.line),
                    fully_qualify(package, &agent.value),
                );
            }
        }
    }

    for child in element.child_elements() {
        collect_manifest_element(source, child, package, keep_set, main_dex_only);
    }
}

/// Collect keep rules from a resource XML file: custom view elements
/// and `<fragment>` class references.
pub fn collect_xml_rules(source: &Source, doc: &XmlResource, keep_set: &mut KeepSet) {
    collect_xml_element(source, &doc.root, keep_set);
}

fn collect_xml_element(source: &Source, element: &Element, keep_set: &mut KeepSet) {
    let line_source = source.with_line(element.line);

    if element.name == "fragment" || element.name == "view" {
        let class = element
            .find_attribute("", "class")
            .or_else(|| element.find_attribute(SCHEMA_ANDROID, "name"));
        if let Some(class) = class {
            keep_set.add_class(&line_source, class.value.clone());
        }
    } else if element.namespace_uri.is_empty() && element.name.contains('.') {
        // A fully-qualified element name is a custom view.
        keep_set.add_view_constructor(&line_source, element.name.clone());
    }

    for child in element.child_elements() {
        collect_xml_element(source, child, keep_set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::xml::inflate;
    use crate::util::Diagnostics;

    fn doc(xml: &str) -> XmlResource {
        let diag = Diagnostics::capturing();
        inflate(xml.as_bytes(), &Source::new("test.xml"), &diag).unwrap()
    }

    #[test]
    fn test_manifest_rules() {
        let manifest = doc(r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.x">
    <application android:name=".App" android:backupAgent="com.x.Agent">
        <activity android:name=".MainActivity" />
        <service android:name="com.other.Sync" />
    </application>
</manifest>"#);

        let mut keep_set = KeepSet::new();
        collect_manifest_rules(
            &Source::new("AndroidManifest.xml"),
            &manifest,
            "com.x",
            &mut keep_set,
            false,
        );

        let rules = keep_set.to_rules();
        assert!(rules.contains("-keep class com.x.App"));
        assert!(rules.contains("-keep class com.x.Agent"));
        assert!(rules.contains("-keep class com.x.MainActivity"));
        assert!(rules.contains("-keep class com.other.Sync"));
    }

    #[test]
    fn test_main_dex_only_keeps_application_and_boot_aware() {
        let manifest = doc(r#"<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.x">
    <application android:name=".App">
        <activity android:name=".MainActivity" />
        <service android:name=".BootService" android:directBootAware="true" />
    </application>
</manifest>"#);

        let mut keep_set = KeepSet::new();
        collect_manifest_rules(
            &Source::new("AndroidManifest.xml"),
            &manifest,
            "com.x",
            &mut keep_set,
            true,
        );

        let rules = keep_set.to_rules();
        assert!(rules.contains("com.x.App"));
        assert!(rules.contains("com.x.BootService"));
        assert!(!rules.contains("com.x.MainActivity"));
    }

    #[test]
    fn test_xml_rules() {
        let layout = doc(r#"<LinearLayout xmlns:android="http://schemas.android.com/apk/res/android">
    <com.x.widget.FancyView android:id="@+id/fancy" />
    <fragment android:name="com.x.MapFragment" />
</LinearLayout>"#);

        let mut keep_set = KeepSet::new();
        collect_xml_rules(&Source::new("res/layout/main.xml"), &layout, &mut keep_set);

        let rules = keep_set.to_rules();
        assert!(rules.contains(
            "-keep class com.x.widget.FancyView { <init>(android.content.Context, android.util.AttributeSet); }"
        ));
        assert!(rules.contains("-keep class com.x.MapFragment { <init>(...); }"));
    }

    #[test]
    fn test_rules_are_deterministic() {
        let mut a = KeepSet::new();
        let mut b = KeepSet::new();
        let source = Source::new("x");
        a.add_class(&source, "com.b.B");
        a.add_class(&source, "com.a.A");
        b.add_class(&source, "com.a.A");
        b.add_class(&source, "com.b.B");
        assert_eq!(a.to_rules(), b.to_rules());
    }
}
