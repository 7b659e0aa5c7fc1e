//! The in-memory resource table.
//!
//! A `ResourceTable` owns packages, which own type groups, which own
//! entries, which own one value per (configuration, product). Containers
//! preserve insertion order; stages that need a particular order sort
//! explicitly so output stays deterministic.

use std::sync::Arc;

use crate::core::config::ConfigDescription;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::value::{FileReference, Item, Source, Value, ValueKind, Visibility};
use crate::io::file::InputFile;
use crate::util::Diagnostics;

/// One value of an entry under a specific configuration and product.
#[derive(Debug, Clone)]
pub struct ConfigValue {
    pub config: ConfigDescription,
    /// Product tag; empty means the `default` product.
    pub product: String,
    pub value: Value,
}

/// A named resource with all its configured values.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub id: Option<u16>,
    pub visibility: Visibility,
    /// Where the strictest visibility declaration came from.
    pub visibility_source: Option<Source>,
    pub values: Vec<ConfigValue>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Entry {
            name: name.into(),
            id: None,
            visibility: Visibility::Default,
            visibility_source: None,
            values: Vec::new(),
        }
    }

    pub fn find_value(&self, config: &ConfigDescription, product: &str) -> Option<&ConfigValue> {
        self.values
            .iter()
            .find(|cv| cv.config == *config && cv.product == product)
    }

    pub fn find_value_mut(
        &mut self,
        config: &ConfigDescription,
        product: &str,
    ) -> Option<&mut ConfigValue> {
        self.values
            .iter_mut()
            .find(|cv| cv.config == *config && cv.product == product)
    }
}

/// All entries of one resource type within a package.
#[derive(Debug, Clone)]
pub struct TypeGroup {
    pub ty: ResourceType,
    pub id: Option<u8>,
    pub entries: Vec<Entry>,
}

impl TypeGroup {
    pub fn new(ty: ResourceType) -> Self {
        TypeGroup {
            ty,
            id: None,
            entries: Vec::new(),
        }
    }

    pub fn find_entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn find_entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    pub fn find_or_create_entry(&mut self, name: &str) -> &mut Entry {
        if let Some(idx) = self.entries.iter().position(|e| e.name == name) {
            return &mut self.entries[idx];
        }
        self.entries.push(Entry::new(name));
        self.entries.last_mut().unwrap()
    }
}

/// One package worth of resources.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub id: Option<u8>,
    pub types: Vec<TypeGroup>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            id: None,
            types: Vec::new(),
        }
    }

    pub fn find_type(&self, ty: ResourceType) -> Option<&TypeGroup> {
        self.types.iter().find(|t| t.ty == ty)
    }

    pub fn find_type_mut(&mut self, ty: ResourceType) -> Option<&mut TypeGroup> {
        self.types.iter_mut().find(|t| t.ty == ty)
    }

    pub fn find_or_create_type(&mut self, ty: ResourceType) -> &mut TypeGroup {
        if let Some(idx) = self.types.iter().position(|t| t.ty == ty) {
            return &mut self.types[idx];
        }
        self.types.push(TypeGroup::new(ty));
        self.types.last_mut().unwrap()
    }
}

/// How a duplicate (config, product) insertion resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionResult {
    KeepOriginal,
    TakeNew,
    Conflict,
}

/// Decide what happens when two values land on the same (config, product).
///
/// Auto-generated `Id` markers always lose to concrete definitions, and
/// byte-identical redefinitions are tolerated.
pub fn resolve_value_collision(existing: &Value, incoming: &Value) -> CollisionResult {
    if incoming.is_id_marker() {
        return CollisionResult::KeepOriginal;
    }
    if existing.is_id_marker() {
        return CollisionResult::TakeNew;
    }
    if existing.kind == incoming.kind {
        return CollisionResult::KeepOriginal;
    }
    CollisionResult::Conflict
}

fn is_valid_entry_name(name: &str, allow_mangled: bool) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            c.is_ascii_alphanumeric() || c == '_' || c == '.' || (allow_mangled && c == '$')
        })
}

/// The table every link stage operates on.
#[derive(Debug, Clone, Default)]
pub struct ResourceTable {
    pub packages: Vec<Package>,
}

impl ResourceTable {
    pub fn new() -> Self {
        ResourceTable::default()
    }

    pub fn find_package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    pub fn find_package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.iter_mut().find(|p| p.name == name)
    }

    pub fn find_package_by_id_mut(&mut self, id: u8) -> Option<&mut Package> {
        self.packages.iter_mut().find(|p| p.id == Some(id))
    }

    pub fn find_or_create_package(&mut self, name: &str) -> &mut Package {
        if let Some(idx) = self.packages.iter().position(|p| p.name == name) {
            return &mut self.packages[idx];
        }
        self.packages.push(Package::new(name));
        self.packages.last_mut().unwrap()
    }

    /// Look up an entry by its fully-qualified name.
    pub fn find_resource(&self, name: &ResourceName) -> Option<&Entry> {
        self.find_package(&name.package)?
            .find_type(name.ty)?
            .find_entry(&name.entry)
    }

    pub fn find_resource_mut(&mut self, name: &ResourceName) -> Option<&mut Entry> {
        self.find_package_mut(&name.package)?
            .find_type_mut(name.ty)?
            .find_entry_mut(&name.entry)
    }

    /// Add a value for `name` under `config`/`product`.
    pub fn add_resource(
        &mut self,
        name: &ResourceName,
        config: &ConfigDescription,
        product: &str,
        value: Value,
        diag: &Diagnostics,
    ) -> bool {
        self.add_resource_impl(name, config, product, value, false, diag)
    }

    /// Like [`add_resource`](Self::add_resource) but accepts mangled
    /// entry names containing `$`.
    pub fn add_resource_allow_mangled(
        &mut self,
        name: &ResourceName,
        config: &ConfigDescription,
        product: &str,
        value: Value,
        diag: &Diagnostics,
    ) -> bool {
        self.add_resource_impl(name, config, product, value, true, diag)
    }

    fn add_resource_impl(
        &mut self,
        name: &ResourceName,
        config: &ConfigDescription,
        product: &str,
        value: Value,
        allow_mangled: bool,
        diag: &Diagnostics,
    ) -> bool {
        if !is_valid_entry_name(&name.entry, allow_mangled) {
            diag.error_at(
                &value.source,
                format!("resource '{}' has invalid entry name '{}'", name, name.entry),
            );
            return false;
        }

        let entry = self
            .find_or_create_package(&name.package)
            .find_or_create_type(name.ty)
            .find_or_create_entry(&name.entry);

        match entry.find_value_mut(config, product) {
            None => {
                entry.values.push(ConfigValue {
                    config: config.clone(),
                    product: product.to_string(),
                    value,
                });
                true
            }
            Some(existing) => match resolve_value_collision(&existing.value, &value) {
                CollisionResult::KeepOriginal => true,
                CollisionResult::TakeNew => {
                    existing.value = value;
                    true
                }
                CollisionResult::Conflict => {
                    diag.error_at(
                        &value.source,
                        format!("duplicate value for resource '{}' with config '{}'", name, config),
                    );
                    diag.note_at(&existing.value.source, "resource previously defined here");
                    false
                }
            },
        }
    }

    /// Register a file reference pointing at `dst_path` in the archive.
    pub fn add_file_reference(
        &mut self,
        name: &ResourceName,
        config: &ConfigDescription,
        source: Source,
        dst_path: impl Into<String>,
        file: Option<Arc<InputFile>>,
        diag: &Diagnostics,
    ) -> bool {
        let value = Value::new(
            source,
            ValueKind::Item(Item::FileReference(FileReference {
                path: dst_path.into(),
                file,
            })),
        );
        self.add_resource_impl(name, config, "", value, true, diag)
    }

    /// Record a visibility declaration, merging into the stricter of the
    /// current and incoming levels.
    pub fn set_visibility(
        &mut self,
        name: &ResourceName,
        visibility: Visibility,
        source: Source,
        diag: &Diagnostics,
    ) -> bool {
        if !is_valid_entry_name(&name.entry, true) {
            diag.error_at(
                &source,
                format!("resource '{}' has invalid entry name '{}'", name, name.entry),
            );
            return false;
        }

        let entry = self
            .find_or_create_package(&name.package)
            .find_or_create_type(name.ty)
            .find_or_create_entry(&name.entry);

        if visibility > entry.visibility {
            entry.visibility = visibility;
            entry.visibility_source = Some(source);
        }
        true
    }
}
