//! Layered symbol lookup.
//!
//! A `SymbolTable` walks an ordered list of sources and caches results.
//! The final table itself is consulted first by the reference linker;
//! the sources here cover everything external: static library tables
//! from `-I` includes and binary tables inside include archives.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::codec::binary::{parse_attr_format, BinaryEntry};
use crate::core::id::ResourceId;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::table::ResourceTable;
use crate::core::config::ConfigDescription;
use crate::core::value::{AttributeDecl, Visibility};

/// A resolved symbol.
#[derive(Debug, Clone, Default)]
pub struct Symbol {
    pub id: Option<ResourceId>,
    pub is_public: bool,
    /// Set when the symbol is an `attr` with a format constraint.
    pub attribute: Option<AttributeDecl>,
    /// Whether the symbol came from a merged library.
    pub from_library: bool,
}

/// One layer of the lookup chain.
pub trait SymbolSource {
    fn find_by_name(&self, name: &ResourceName) -> Option<Symbol>;
    fn find_by_id(&self, id: ResourceId) -> Option<Symbol>;
}

/// Ordered, caching lookup over all sources.
#[derive(Default)]
pub struct SymbolTable {
    sources: Vec<Box<dyn SymbolSource>>,
    name_cache: RefCell<HashMap<ResourceName, Option<Rc<Symbol>>>>,
    id_cache: RefCell<HashMap<ResourceId, Option<Rc<Symbol>>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Add a source at the end of the chain (lowest priority).
    pub fn append_source(&mut self, source: Box<dyn SymbolSource>) {
        self.sources.push(source);
        self.clear_caches();
    }

    /// Add a source at the front of the chain (highest priority).
    pub fn prepend_source(&mut self, source: Box<dyn SymbolSource>) {
        self.sources.insert(0, source);
        self.clear_caches();
    }

    fn clear_caches(&mut self) {
        self.name_cache.borrow_mut().clear();
        self.id_cache.borrow_mut().clear();
    }

    pub fn find_by_name(&self, name: &ResourceName) -> Option<Rc<Symbol>> {
        if let Some(cached) = self.name_cache.borrow().get(name) {
            return cached.clone();
        }
        let found = self
            .sources
            .iter()
            .find_map(|source| source.find_by_name(name))
            .map(Rc::new);
        self.name_cache
            .borrow_mut()
            .insert(name.clone(), found.clone());
        found
    }

    pub fn find_by_id(&self, id: ResourceId) -> Option<Rc<Symbol>> {
        if let Some(cached) = self.id_cache.borrow().get(&id) {
            return cached.clone();
        }
        let found = self
            .sources
            .iter()
            .find_map(|source| source.find_by_id(id))
            .map(Rc::new);
        self.id_cache.borrow_mut().insert(id, found.clone());
        found
    }
}

/// Build a symbol for `entry` of `table`, shared by the table-backed
/// source and the reference linker's final-table lookups.
pub fn symbol_from_table_entry(
    table: &ResourceTable,
    name: &ResourceName,
    from_library: bool,
) -> Option<Symbol> {
    let package = table.find_package(&name.package)?;
    let group = package.find_type(name.ty)?;
    let entry = group.find_entry(&name.entry)?;

    let id = match (package.id, group.id, entry.id) {
        (Some(p), Some(t), Some(e)) => Some(ResourceId::new(p, t, e)),
        _ => None,
    };

    let attribute = if name.ty == ResourceType::Attr || name.ty == ResourceType::AttrPrivate {
        entry
            .values
            .iter()
            .find(|cv| cv.config == ConfigDescription::default())
            .or_else(|| entry.values.first())
            .and_then(|cv| match &cv.value.kind {
                crate::core::value::ValueKind::Attribute(attr) => Some(attr.clone()),
                _ => None,
            })
    } else {
        None
    };

    Some(Symbol {
        id,
        is_public: entry.visibility == Visibility::Public,
        attribute,
        from_library,
    })
}

/// Symbols backed by a loaded resource table (static library includes).
pub struct TableSymbolSource {
    table: Rc<ResourceTable>,
    from_library: bool,
}

impl TableSymbolSource {
    pub fn new(table: Rc<ResourceTable>, from_library: bool) -> Self {
        TableSymbolSource {
            table,
            from_library,
        }
    }
}

impl SymbolSource for TableSymbolSource {
    fn find_by_name(&self, name: &ResourceName) -> Option<Symbol> {
        symbol_from_table_entry(&self.table, name, self.from_library)
    }

    fn find_by_id(&self, id: ResourceId) -> Option<Symbol> {
        let package = self.table.packages.iter().find(|p| p.id == Some(id.package_id()))?;
        let group = package.types.iter().find(|t| t.id == Some(id.type_id()))?;
        let entry = group.entries.iter().find(|e| e.id == Some(id.entry_id()))?;
        let name = ResourceName::new(package.name.clone(), group.ty, entry.name.clone());
        symbol_from_table_entry(&self.table, &name, self.from_library)
    }
}

/// Symbols backed by the binary tables of include archives (framework
/// symbols from `-I`).
#[derive(Default)]
pub struct AssetSymbolSource {
    by_name: HashMap<ResourceName, Symbol>,
    by_id: HashMap<ResourceId, Symbol>,
}

impl AssetSymbolSource {
    pub fn new() -> Self {
        AssetSymbolSource::default()
    }

    /// Index the entries of one include's binary table.
    pub fn add_entries(&mut self, entries: &[BinaryEntry]) {
        for entry in entries {
            let attribute = if entry.name.ty == ResourceType::Attr {
                parse_attr_format(&entry.value).map(|format| AttributeDecl {
                    format,
                    symbols: Vec::new(),
                })
            } else {
                None
            };
            let symbol = Symbol {
                id: Some(entry.id),
                is_public: entry.public,
                attribute,
                from_library: false,
            };
            // First definition wins across densities and locales.
            self.by_name.entry(entry.name.clone()).or_insert_with(|| symbol.clone());
            self.by_id.entry(entry.id).or_insert(symbol);
        }
    }
}

impl SymbolSource for AssetSymbolSource {
    fn find_by_name(&self, name: &ResourceName) -> Option<Symbol> {
        self.by_name.get(name).cloned()
    }

    fn find_by_id(&self, id: ResourceId) -> Option<Symbol> {
        self.by_id.get(&id).cloned()
    }
}
