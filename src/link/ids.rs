//! ID assignment.
//!
//! Entries named in the stable-ID map get their mapped IDs first; the
//! rest are filled densely, skipping reserved values, so re-linking
//! with an emitted map reproduces the same assignment.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use thiserror::Error;

use crate::core::id::ResourceId;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::table::ResourceTable;
use crate::core::value::Source;
use crate::util::fs as util_fs;
use crate::util::Diagnostics;

/// ID assignment failures.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("stable ID {id} for '{name}' contradicts package ID 0x{actual:02x}")]
    PackageIdMismatch {
        name: String,
        id: ResourceId,
        actual: u8,
    },

    #[error("stable ID {id} for '{name}' contradicts type ID 0x{actual:02x}")]
    TypeIdMismatch {
        name: String,
        id: ResourceId,
        actual: u8,
    },

    #[error("stable ID {id} for '{name}' contradicts entry ID 0x{actual:04x}")]
    EntryIdMismatch {
        name: String,
        id: ResourceId,
        actual: u16,
    },

    #[error("no free entry ID for type '{ty}'")]
    NoFreeEntryId { ty: String },
}

/// Load a `name = 0xPPTTEEEE` map from disk.
pub fn load_stable_id_map(
    path: &Path,
    diag: &Diagnostics,
) -> Option<HashMap<ResourceName, ResourceId>> {
    let contents = match util_fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            diag.error(format!("{:#}", err));
            return None;
        }
    };

    let file_source = Source::new(path);
    let mut map = HashMap::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_source = file_source.with_line(index + 1);

        let Some((name_str, id_str)) = line.split_once('=') else {
            diag.error_at(&line_source, "missing '='");
            return None;
        };

        let name = match ResourceName::parse(name_str.trim()) {
            Ok(name) => name,
            Err(err) => {
                diag.error_at(&line_source, err.to_string());
                return None;
            }
        };
        let id = match ResourceId::parse(id_str.trim()) {
            Ok(id) => id,
            Err(err) => {
                diag.error_at(&line_source, err.to_string());
                return None;
            }
        };
        map.insert(name, id);
    }
    Some(map)
}

/// Write the assigned IDs of `table` as a stable-ID map.
pub fn emit_stable_id_map(path: &Path, table: &ResourceTable) -> anyhow::Result<()> {
    let mut lines = Vec::new();
    for package in &table.packages {
        for group in &package.types {
            for entry in &group.entries {
                if let (Some(p), Some(t), Some(e)) = (package.id, group.id, entry.id) {
                    lines.push(format!(
                        "{}:{}/{} = {}",
                        package.name,
                        group.ty,
                        entry.name,
                        ResourceId::new(p, t, e)
                    ));
                }
            }
        }
    }
    lines.sort();
    lines.push(String::new());
    util_fs::write_string(path, &lines.join("\n"))
}

/// Assign package, type, and entry IDs, honoring `stable_ids`.
pub fn assign_ids(
    table: &mut ResourceTable,
    stable_ids: &HashMap<ResourceName, ResourceId>,
    diag: &Diagnostics,
) -> bool {
    // Seed everything the stable map pins down, in name order so
    // conflicting map entries fail deterministically.
    let mut sorted_ids: Vec<(&ResourceName, &ResourceId)> = stable_ids.iter().collect();
    sorted_ids.sort();

    for (name, id) in sorted_ids {
        let Some(package) = table.find_package_mut(&name.package) else {
            continue;
        };
        if let Some(actual) = package.id {
            if actual != id.package_id() {
                diag.error(
                    IdError::PackageIdMismatch {
                        name: name.to_string(),
                        id: *id,
                        actual,
                    }
                    .to_string(),
                );
                return false;
            }
        }
        package.id = Some(id.package_id());

        let Some(group) = package.find_type_mut(name.ty) else {
            continue;
        };
        if let Some(actual) = group.id {
            if actual != id.type_id() {
                diag.error(
                    IdError::TypeIdMismatch {
                        name: name.to_string(),
                        id: *id,
                        actual,
                    }
                    .to_string(),
                );
                return false;
            }
        }
        group.id = Some(id.type_id());

        let Some(entry) = group.find_entry_mut(&name.entry) else {
            continue;
        };
        if let Some(actual) = entry.id {
            if actual != id.entry_id() {
                diag.error(
                    IdError::EntryIdMismatch {
                        name: name.to_string(),
                        id: *id,
                        actual,
                    }
                    .to_string(),
                );
                return false;
            }
        }
        entry.id = Some(id.entry_id());
    }

    for package in &mut table.packages {
        // Types with pre-assigned IDs keep them; the rest follow in
        // canonical type order starting at 1.
        let mut taken_type_ids: BTreeSet<u8> =
            package.types.iter().filter_map(|t| t.id).collect();

        package.types.sort_by_key(|t| (t.id.is_none(), t.id, t.ty));

        let mut next_type_id: u8 = 1;
        for group in &mut package.types {
            if group.id.is_none() {
                while taken_type_ids.contains(&next_type_id) {
                    next_type_id += 1;
                }
                group.id = Some(next_type_id);
                taken_type_ids.insert(next_type_id);
            }

            // Entry IDs reserved by the stable map stay untouchable even
            // when the mapped entry is absent from this build.
            let mut reserved: BTreeSet<u16> = stable_ids
                .iter()
                .filter(|(name, id)| {
                    name.package == package.name
                        && name.ty == group.ty
                        && Some(id.type_id()) == group.id
                })
                .map(|(_, id)| id.entry_id())
                .collect();
            reserved.extend(group.entries.iter().filter_map(|e| e.id));

            let mut next_entry_id: u16 = 0;
            for entry in &mut group.entries {
                if entry.id.is_some() {
                    continue;
                }
                while reserved.contains(&next_entry_id) {
                    if next_entry_id == u16::MAX {
                        diag.error(
                            IdError::NoFreeEntryId {
                                ty: group.ty.to_string(),
                            }
                            .to_string(),
                        );
                        return false;
                    }
                    next_entry_id += 1;
                }
                entry.id = Some(next_entry_id);
                reserved.insert(next_entry_id);
            }
        }
    }
    true
}

/// Verify that nothing in the table carries an ID yet; static library
/// output must stay unassigned so it can merge into any app.
pub fn verify_no_ids(table: &ResourceTable, diag: &Diagnostics) -> bool {
    for package in &table.packages {
        for group in &package.types {
            if let Some(id) = group.id {
                diag.error(format!("type '{}' has ID 0x{:02x} assigned", group.ty, id));
                return false;
            }
            for entry in &group.entries {
                if let Some(id) = entry.id {
                    diag.error(format!(
                        "entry '{}:{}/{}' has ID 0x{:04x} assigned",
                        package.name, group.ty, entry.name, id
                    ));
                    return false;
                }
            }
        }
    }
    true
}

/// Move non-public attributes into the `^attr-private` type so public
/// attribute IDs stay dense and stable across builds.
pub fn move_private_attributes(table: &mut ResourceTable) {
    for package in &mut table.packages {
        let Some(attr_index) = package
            .types
            .iter()
            .position(|t| t.ty == ResourceType::Attr)
        else {
            continue;
        };

        let has_public = package.types[attr_index]
            .entries
            .iter()
            .any(|e| e.visibility == crate::core::value::Visibility::Public);
        let has_private = package.types[attr_index]
            .entries
            .iter()
            .any(|e| e.visibility != crate::core::value::Visibility::Public);
        if !has_public || !has_private {
            // All public or all private: nothing to separate.
            continue;
        }

        let (public, private): (Vec<_>, Vec<_>) = package.types[attr_index]
            .entries
            .drain(..)
            .partition(|e| e.visibility == crate::core::value::Visibility::Public);
        package.types[attr_index].entries = public;
        package
            .find_or_create_type(ResourceType::AttrPrivate)
            .entries
            .extend(private);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ConfigDescription;
    use crate::core::value::{Item, Value};

    fn table_with_strings(names: &[&str]) -> ResourceTable {
        let diag = Diagnostics::capturing();
        let mut table = ResourceTable::new();
        for name in names {
            table.add_resource(
                &ResourceName::parse(name).unwrap(),
                &ConfigDescription::default(),
                "",
                Value::item(Source::new("values.xml"), Item::String("v".into())),
                &diag,
            );
        }
        table.find_package_mut(
            &ResourceName::parse(names[0]).unwrap().package,
        )
        .unwrap()
        .id = Some(0x7f);
        table
    }

    #[test]
    fn test_dense_assignment() {
        let diag = Diagnostics::capturing();
        let mut table =
            table_with_strings(&["com.x:string/a", "com.x:string/b", "com.x:layout/main"]);

        assert!(assign_ids(&mut table, &HashMap::new(), &diag));

        let package = table.find_package("com.x").unwrap();
        let mut seen = BTreeSet::new();
        for group in &package.types {
            assert!(group.id.is_some());
            for entry in &group.entries {
                let id = ResourceId::new(0x7f, group.id.unwrap(), entry.id.unwrap());
                assert!(seen.insert(id), "duplicate ID {}", id);
            }
        }
    }

    #[test]
    fn test_stable_map_is_honored_and_reserved() {
        let diag = Diagnostics::capturing();
        let mut table = table_with_strings(&["com.x:string/a", "com.x:string/b"]);

        let mut stable = HashMap::new();
        stable.insert(
            ResourceName::parse("com.x:string/b").unwrap(),
            ResourceId(0x7f010000),
        );
        // A reservation for an entry that is not in this build.
        stable.insert(
            ResourceName::parse("com.x:string/gone").unwrap(),
            ResourceId(0x7f010001),
        );

        assert!(assign_ids(&mut table, &stable, &diag));

        let entry_b = table
            .find_resource(&ResourceName::parse("com.x:string/b").unwrap())
            .unwrap();
        assert_eq!(entry_b.id, Some(0x0000));

        // `a` skips 0 (taken) and 1 (reserved by the absent entry).
        let entry_a = table
            .find_resource(&ResourceName::parse("com.x:string/a").unwrap())
            .unwrap();
        assert_eq!(entry_a.id, Some(0x0002));
    }

    #[test]
    fn test_contradicting_stable_ids_fail() {
        let diag = Diagnostics::capturing();
        let mut table = table_with_strings(&["com.x:string/a"]);

        let mut stable = HashMap::new();
        stable.insert(
            ResourceName::parse("com.x:string/a").unwrap(),
            // Package 0x02 contradicts the pre-set 0x7f.
            ResourceId(0x02010000),
        );
        assert!(!assign_ids(&mut table, &stable, &diag));
        assert!(diag.error_count() > 0);
    }

    #[test]
    fn test_stable_id_file_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ids.txt");

        let diag = Diagnostics::capturing();
        let mut table = table_with_strings(&["com.x:string/a", "com.x:string/b"]);
        assert!(assign_ids(&mut table, &HashMap::new(), &diag));
        emit_stable_id_map(&path, &table).unwrap();

        let loaded = load_stable_id_map(&path, &diag).unwrap();
        assert_eq!(diag.error_count(), 0);
        assert_eq!(loaded.len(), 2);

        // Re-assigning a fresh table with the emitted map reproduces IDs.
        let mut table2 = table_with_strings(&["com.x:string/b", "com.x:string/a"]);
        assert!(assign_ids(&mut table2, &loaded, &diag));
        for (name, id) in &loaded {
            assert_eq!(table2.find_resource(name).unwrap().id, Some(id.entry_id()));
        }
    }

    #[test]
    fn test_stable_id_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ids.txt");

        std::fs::write(&path, "com.x:string/a 0x7f010000\n").unwrap();
        let diag = Diagnostics::capturing();
        assert!(load_stable_id_map(&path, &diag).is_none());

        std::fs::write(&path, "\ncom.x:string/a = 0x7f010000\n\n").unwrap();
        let diag = Diagnostics::capturing();
        assert_eq!(load_stable_id_map(&path, &diag).unwrap().len(), 1);

        std::fs::write(&path, "nonsense/a = 0x7f010000\n").unwrap();
        let diag = Diagnostics::capturing();
        assert!(load_stable_id_map(&path, &diag).is_none());
    }

    #[test]
    fn test_verify_no_ids() {
        let diag = Diagnostics::capturing();
        let mut table = table_with_strings(&["com.x:string/a"]);
        assert!(verify_no_ids(&table, &diag));
        assert!(assign_ids(&mut table, &HashMap::new(), &diag));
        assert!(!verify_no_ids(&table, &diag));
    }

    #[test]
    fn test_move_private_attributes() {
        use crate::core::value::{AttributeDecl, ValueKind, Visibility};
        let diag = Diagnostics::capturing();
        let mut table = ResourceTable::new();
        for name in ["com.x:attr/pub", "com.x:attr/priv"] {
            table.add_resource(
                &ResourceName::parse(name).unwrap(),
                &ConfigDescription::default(),
                "",
                Value::new(
                    Source::new("attrs.xml"),
                    ValueKind::Attribute(AttributeDecl::any()),
                ),
                &diag,
            );
        }
        table.set_visibility(
            &ResourceName::parse("com.x:attr/pub").unwrap(),
            Visibility::Public,
            Source::new("public.xml"),
            &diag,
        );

        move_private_attributes(&mut table);

        assert!(table
            .find_resource(&ResourceName::parse("com.x:attr/pub").unwrap())
            .is_some());
        assert!(table
            .find_resource(&ResourceName::parse("com.x:attr/priv").unwrap())
            .is_none());
        assert!(table
            .find_resource(&ResourceName::parse("com.x:^attr-private/priv").unwrap())
            .is_some());
    }
}
