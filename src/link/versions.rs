//! SDK versioning of resources.
//!
//! Styles that use attributes introduced after the minimum SDK get
//! versioned copies so older runtimes never see attributes they cannot
//! parse. After versioning, configurations made redundant by the
//! minimum SDK are collapsed away.

use crate::core::config::ConfigDescription;
use crate::core::name::ResourceType;
use crate::core::table::{ConfigValue, Entry, ResourceTable};
use crate::core::value::{Style, Value, ValueKind};
use crate::link::reference::attribute_sdk_level;

/// Whether a versioned copy of `entry` at `sdk_level` should be
/// generated, or an existing sibling already supersedes it.
pub fn should_generate_versioned_resource(
    entry: &Entry,
    config: &ConfigDescription,
    sdk_level: u16,
) -> bool {
    !entry.values.iter().any(|cv| {
        cv.config.without_sdk_version() == config.without_sdk_version()
            && cv.config.sdk_version > config.sdk_version
            && cv.config.sdk_version <= sdk_level
    })
}

/// Synthesize versioned copies of styles that reference newer
/// attributes.
pub fn version_styles(table: &mut ResourceTable, min_sdk: u16) {
    for package in &mut table.packages {
        for group in &mut package.types {
            if group.ty != ResourceType::Style {
                continue;
            }
            for entry in &mut group.entries {
                version_style_entry(entry, min_sdk);
            }
        }
    }
}

/// A style needs a copy at `level` unless some sibling in the same
/// config family already targets that level or higher.
fn style_needs_version(entry: &Entry, config: &ConfigDescription, level: u16) -> bool {
    !entry.values.iter().any(|cv| {
        cv.config.without_sdk_version() == config.without_sdk_version()
            && cv.config.sdk_version >= level
    })
}

fn version_style_entry(entry: &mut Entry, min_sdk: u16) {
    // Indices are snapshotted: clones appended here must not be
    // revisited or the pass would not be idempotent.
    let original_count = entry.values.len();
    for index in 0..original_count {
        let cv = &entry.values[index];
        let ValueKind::Style(style) = &cv.value.kind else {
            continue;
        };

        let floor = min_sdk.max(cv.config.sdk_version);
        let mut levels: Vec<u16> = style
            .entries
            .iter()
            .filter_map(|e| e.key.id.map(attribute_sdk_level))
            .filter(|level| *level > floor)
            .collect();
        levels.sort_unstable();
        levels.dedup();

        for level in levels {
            if !style_needs_version(entry, &entry.values[index].config, level) {
                continue;
            }

            let cv = &entry.values[index];
            let ValueKind::Style(style) = &cv.value.kind else {
                continue;
            };
            let cloned_style = Style {
                parent: style.parent.clone(),
                entries: style
                    .entries
                    .iter()
                    .filter(|e| {
                        e.key
                            .id
                            .map(|id| attribute_sdk_level(id) <= level)
                            .unwrap_or(true)
                    })
                    .cloned()
                    .collect(),
            };

            let new_value = ConfigValue {
                config: cv.config.with_sdk_version(level),
                product: cv.product.clone(),
                value: Value::new(cv.value.source.clone(), ValueKind::Style(cloned_style)),
            };
            entry.values.push(new_value);
        }
    }
}

/// Collapse configurations superseded by the minimum SDK: among values
/// differing only in `sdkVersion`, every version below `min_sdk` is
/// dropped except the largest, which becomes the new floor (version 0).
pub fn collapse_versions(table: &mut ResourceTable, min_sdk: u16) {
    if min_sdk == 0 {
        return;
    }
    for package in &mut table.packages {
        for group in &mut package.types {
            for entry in &mut group.entries {
                collapse_entry(entry, min_sdk);
            }
        }
    }
}

fn collapse_entry(entry: &mut Entry, min_sdk: u16) {
    // Largest below-minimum version per (config-sans-sdk, product) group.
    let mut keep_version: Vec<(ConfigDescription, String, u16)> = Vec::new();
    for cv in &entry.values {
        if cv.config.sdk_version >= min_sdk {
            continue;
        }
        let key_config = cv.config.without_sdk_version();
        match keep_version
            .iter_mut()
            .find(|(config, product, _)| *config == key_config && *product == cv.product)
        {
            Some((_, _, version)) => *version = (*version).max(cv.config.sdk_version),
            None => keep_version.push((key_config, cv.product.clone(), cv.config.sdk_version)),
        }
    }

    entry.values.retain(|cv| {
        if cv.config.sdk_version >= min_sdk {
            return true;
        }
        keep_version.iter().any(|(config, product, version)| {
            *config == cv.config.without_sdk_version()
                && *product == cv.product
                && *version == cv.config.sdk_version
        })
    });

    for cv in &mut entry.values {
        if cv.config.sdk_version != 0 && cv.config.sdk_version < min_sdk {
            cv.config.sdk_version = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::ResourceId;
    use crate::core::name::ResourceName;
    use crate::core::value::{Item, Reference, Source, StyleEntry};
    use crate::util::Diagnostics;

    fn style_with_attr_ids(attr_ids: &[u32]) -> ValueKind {
        ValueKind::Style(Style {
            parent: None,
            entries: attr_ids
                .iter()
                .map(|id| StyleEntry {
                    key: Reference {
                        id: Some(ResourceId(*id)),
                        ..Reference::default()
                    },
                    value: Item::String("v".into()),
                })
                .collect(),
        })
    }

    fn add_style(table: &mut ResourceTable, config: &str, kind: ValueKind) {
        let diag = Diagnostics::capturing();
        table.add_resource(
            &ResourceName::parse("com.x:style/Main").unwrap(),
            &ConfigDescription::parse(config).unwrap(),
            "",
            Value::new(Source::new("styles.xml"), kind),
            &diag,
        );
    }

    fn style_entry(table: &ResourceTable) -> &Entry {
        table
            .find_resource(&ResourceName::parse("com.x:style/Main").unwrap())
            .unwrap()
    }

    #[test]
    fn test_versioning_clones_style_at_attr_sdk() {
        let mut table = ResourceTable::new();
        // 0x010102b4 was introduced at SDK 7, 0x01010400 at SDK 21.
        add_style(&mut table, "default", style_with_attr_ids(&[0x010102b4, 0x01010400]));

        version_styles(&mut table, 4);
        let entry = style_entry(&table);
        assert_eq!(entry.values.len(), 3);

        let v7 = entry
            .values
            .iter()
            .find(|cv| cv.config.sdk_version == 7)
            .unwrap();
        match &v7.value.kind {
            ValueKind::Style(style) => assert_eq!(style.entries.len(), 1),
            other => panic!("expected style, got {:?}", other),
        }

        let v21 = entry
            .values
            .iter()
            .find(|cv| cv.config.sdk_version == 21)
            .unwrap();
        match &v21.value.kind {
            ValueKind::Style(style) => assert_eq!(style.entries.len(), 2),
            other => panic!("expected style, got {:?}", other),
        }
    }

    #[test]
    fn test_versioning_respects_min_sdk() {
        let mut table = ResourceTable::new();
        add_style(&mut table, "default", style_with_attr_ids(&[0x010102b4]));

        // Attribute from SDK 7 needs no copy when minSdk is already 21.
        version_styles(&mut table, 21);
        assert_eq!(style_entry(&table).values.len(), 1);
    }

    #[test]
    fn test_versioning_skips_superseded_levels() {
        let mut table = ResourceTable::new();
        add_style(&mut table, "default", style_with_attr_ids(&[0x01010400]));
        add_style(&mut table, "v21", style_with_attr_ids(&[0x01010400]));

        version_styles(&mut table, 4);
        // The hand-written v21 style supersedes the would-be clone.
        assert_eq!(style_entry(&table).values.len(), 2);
    }

    #[test]
    fn test_versioning_is_idempotent() {
        let mut table = ResourceTable::new();
        add_style(&mut table, "default", style_with_attr_ids(&[0x010102b4, 0x01010400]));

        version_styles(&mut table, 4);
        let first: Vec<(u16, usize)> = style_entry(&table)
            .values
            .iter()
            .map(|cv| {
                let count = match &cv.value.kind {
                    ValueKind::Style(s) => s.entries.len(),
                    _ => 0,
                };
                (cv.config.sdk_version, count)
            })
            .collect();

        version_styles(&mut table, 4);
        let second: Vec<(u16, usize)> = style_entry(&table)
            .values
            .iter()
            .map(|cv| {
                let count = match &cv.value.kind {
                    ValueKind::Style(s) => s.entries.len(),
                    _ => 0,
                };
                (cv.config.sdk_version, count)
            })
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_collapse_drops_superseded_versions() {
        let diag = Diagnostics::capturing();
        let mut table = ResourceTable::new();
        let name = ResourceName::parse("com.x:string/s").unwrap();
        for config in ["default", "v4", "v19", "v21"] {
            table.add_resource(
                &name,
                &ConfigDescription::parse(config).unwrap(),
                "",
                Value::item(Source::new("values.xml"), Item::String(config.into())),
                &diag,
            );
        }

        collapse_versions(&mut table, 21);
        let entry = table.find_resource(&name).unwrap();
        let mut versions: Vec<u16> = entry.values.iter().map(|cv| cv.config.sdk_version).collect();
        versions.sort_unstable();
        // v19 survives as the new floor; default and v4 are gone.
        assert_eq!(versions, vec![0, 21]);
        let floor = entry
            .values
            .iter()
            .find(|cv| cv.config.sdk_version == 0)
            .unwrap();
        assert_eq!(floor.value.kind, ValueKind::Item(Item::String("v19".into())));
    }

    #[test]
    fn test_collapse_keeps_distinct_axes_apart() {
        let diag = Diagnostics::capturing();
        let mut table = ResourceTable::new();
        let name = ResourceName::parse("com.x:string/s").unwrap();
        for config in ["v4", "land-v4"] {
            table.add_resource(
                &name,
                &ConfigDescription::parse(config).unwrap(),
                "",
                Value::item(Source::new("values.xml"), Item::String(config.into())),
                &diag,
            );
        }

        collapse_versions(&mut table, 21);
        let entry = table.find_resource(&name).unwrap();
        assert_eq!(entry.values.len(), 2);
        assert!(entry.values.iter().all(|cv| cv.config.sdk_version == 0));
    }

    #[test]
    fn test_collapse_noop_without_min_sdk() {
        let diag = Diagnostics::capturing();
        let mut table = ResourceTable::new();
        let name = ResourceName::parse("com.x:string/s").unwrap();
        table.add_resource(
            &name,
            &ConfigDescription::parse("v4").unwrap(),
            "",
            Value::item(Source::new("values.xml"), Item::String("x".into())),
            &diag,
        );
        collapse_versions(&mut table, 0);
        assert_eq!(
            table.find_resource(&name).unwrap().values[0].config.sdk_version,
            4
        );
    }
}
