//! Binary resource table codec (`resources.arsc`).
//!
//! A deterministic little-endian chunk layout: strings are length
//! prefixed, containers are count prefixed, and everything is written
//! in table order. The reader exists for inspection and tests; the
//! runtime-facing layout is owned by this codec alone.

use anyhow::{bail, Context, Result};

use crate::core::config::ConfigDescription;
use crate::core::id::ResourceId;
use crate::core::name::{ResourceName, ResourceType};
use crate::core::table::ResourceTable;
use crate::core::value::{Value, ValueKind, Visibility};

const MAGIC: u32 = u32::from_le_bytes(*b"RTB\x02");
const VERSION: u32 = 1;

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u16).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Render a value to the single-line form stored in the table chunk.
pub fn render_value(value: &Value) -> String {
    match &value.kind {
        ValueKind::Item(item) => item.to_string(),
        ValueKind::Id => "<id>".to_string(),
        ValueKind::Style(style) => {
            let mut out = String::from("style{");
            if let Some(parent) = &style.parent {
                out.push_str(&format!("parent={} ", parent));
            }
            let entries: Vec<String> = style
                .entries
                .iter()
                .map(|e| format!("{}={}", e.key, e.value))
                .collect();
            out.push_str(&entries.join(";"));
            out.push('}');
            out
        }
        ValueKind::Array(items) => {
            let rendered: Vec<String> = items.iter().map(|i| i.to_string()).collect();
            format!("array[{}]", rendered.join(";"))
        }
        ValueKind::Plural(plural) => {
            let rendered: Vec<String> = plural
                .values
                .iter()
                .map(|(form, item)| format!("{:?}={}", form, item))
                .collect();
            format!("plurals[{}]", rendered.join(";"))
        }
        ValueKind::Attribute(attr) => format!("attr(format=0x{:x})", attr.format),
    }
}

/// Recover the format mask from a rendered attribute value.
pub fn parse_attr_format(value: &str) -> Option<u32> {
    let hex = value.strip_prefix("attr(format=0x")?.strip_suffix(')')?;
    u32::from_str_radix(hex, 16).ok()
}

/// Flatten the table. Every entry must have its ID assigned.
pub fn flatten_table(table: &ResourceTable) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(table.packages.len() as u32).to_le_bytes());

    for package in &table.packages {
        let package_id = package
            .id
            .with_context(|| format!("package `{}` has no ID", package.name))?;
        out.push(package_id);
        write_string(&mut out, &package.name);
        out.extend_from_slice(&(package.types.len() as u32).to_le_bytes());

        for group in &package.types {
            let type_id = group
                .id
                .with_context(|| format!("type `{}` has no ID", group.ty))?;
            out.push(type_id);
            write_string(&mut out, group.ty.as_str());
            out.extend_from_slice(&(group.entries.len() as u32).to_le_bytes());

            for entry in &group.entries {
                let entry_id = entry.id.with_context(|| {
                    format!("entry `{}:{}/{}` has no ID", package.name, group.ty, entry.name)
                })?;
                out.extend_from_slice(&entry_id.to_le_bytes());
                write_string(&mut out, &entry.name);
                out.push(match entry.visibility {
                    Visibility::Default => 0,
                    Visibility::Private => 1,
                    Visibility::Public => 2,
                });
                out.extend_from_slice(&(entry.values.len() as u32).to_le_bytes());

                for cv in &entry.values {
                    write_string(&mut out, &cv.config.to_string());
                    write_string(&mut out, &cv.product);
                    write_string(&mut out, &render_value(&cv.value));
                }
            }
        }
    }
    Ok(out)
}

/// One flattened entry, as read back by [`parse_table`].
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryEntry {
    pub id: ResourceId,
    pub name: ResourceName,
    pub config: ConfigDescription,
    pub product: String,
    pub public: bool,
    pub value: String,
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let slice = self
            .data
            .get(self.pos..self.pos + n)
            .context("unexpected end of binary table")?;
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).context("invalid UTF-8 in binary table")
    }
}

/// Parse a flattened table back into its entry list.
pub fn parse_table(data: &[u8]) -> Result<Vec<BinaryEntry>> {
    let mut cursor = Cursor { data, pos: 0 };
    if cursor.u32()? != MAGIC {
        bail!("not a binary resource table");
    }
    if cursor.u32()? != VERSION {
        bail!("unsupported binary table version");
    }

    let mut entries = Vec::new();
    let package_count = cursor.u32()?;
    for _ in 0..package_count {
        let package_id = cursor.u8()?;
        let package_name = cursor.string()?;
        let type_count = cursor.u32()?;
        for _ in 0..type_count {
            let type_id = cursor.u8()?;
            let type_name = cursor.string()?;
            let ty: ResourceType = type_name
                .parse()
                .with_context(|| format!("unknown type `{}` in binary table", type_name))?;
            let entry_count = cursor.u32()?;
            for _ in 0..entry_count {
                let entry_id = cursor.u16()?;
                let entry_name = cursor.string()?;
                let visibility = cursor.u8()?;
                let value_count = cursor.u32()?;
                for _ in 0..value_count {
                    let config = ConfigDescription::parse(&cursor.string()?)
                        .context("invalid config in binary table")?;
                    let product = cursor.string()?;
                    let value = cursor.string()?;
                    entries.push(BinaryEntry {
                        id: ResourceId::new(package_id, type_id, entry_id),
                        name: ResourceName::new(package_name.clone(), ty, entry_name.clone()),
                        config,
                        product,
                        public: visibility == 2,
                        value,
                    });
                }
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::{Item, Source};
    use crate::util::Diagnostics;

    fn assigned_table() -> ResourceTable {
        let diag = Diagnostics::capturing();
        let mut table = ResourceTable::new();
        table.add_resource(
            &ResourceName::parse("com.x:string/app_name").unwrap(),
            &ConfigDescription::default(),
            "",
            Value::item(Source::new("values.xml"), Item::String("Hi".into())),
            &diag,
        );
        let package = table.find_package_mut("com.x").unwrap();
        package.id = Some(0x7f);
        let group = package.find_type_mut(ResourceType::String).unwrap();
        group.id = Some(0x01);
        group.entries[0].id = Some(0);
        table
    }

    #[test]
    fn test_flatten_and_parse() {
        let bytes = flatten_table(&assigned_table()).unwrap();
        let entries = parse_table(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, ResourceId(0x7f010000));
        assert_eq!(entries[0].name.to_string(), "com.x:string/app_name");
        assert_eq!(entries[0].value, "Hi");
    }

    #[test]
    fn test_flatten_requires_ids() {
        let mut table = assigned_table();
        table.find_package_mut("com.x").unwrap().types[0].entries[0].id = None;
        assert!(flatten_table(&table).is_err());
    }

    #[test]
    fn test_flatten_is_deterministic() {
        assert_eq!(
            flatten_table(&assigned_table()).unwrap(),
            flatten_table(&assigned_table()).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_table(b"garbage").is_err());
    }
}
