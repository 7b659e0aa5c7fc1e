//! Compiled-file bundle codec (`.flat`).
//!
//! Layout: little-endian `u32` file count, then per file a `u32`
//! header length, the JSON header, and `u64` payload offset / length.
//! Offsets are relative to the start of the bundle, so payloads can be
//! exposed as file segments without copying the bundle.

use serde::{Deserialize, Serialize};

use anyhow::{bail, Context, Result};

use crate::core::config::ConfigDescription;
use crate::core::name::ResourceName;
use crate::core::value::Source;

/// Header of one compiled file inside a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledFileHeader {
    /// Fully-qualified resource name (`pkg:type/entry`; package may be empty).
    pub name: String,
    /// Config qualifier string.
    pub config: String,
    /// Original source path, for diagnostics.
    pub source_path: String,
    /// Symbols exported by the file (`@+id/...`), with their lines.
    #[serde(default)]
    pub exported_symbols: Vec<(String, usize)>,
}

/// A compiled file's parsed description plus the location of its payload.
#[derive(Debug, Clone)]
pub struct CompiledFileEntry {
    pub name: ResourceName,
    pub config: ConfigDescription,
    pub source: Source,
    pub exported_symbols: Vec<(ResourceName, usize)>,
    pub payload_offset: u64,
    pub payload_len: u64,
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes: [u8; 4] = data
        .get(*pos..*pos + 4)
        .context("unexpected end of compiled-file bundle")?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(data: &[u8], pos: &mut usize) -> Result<u64> {
    let bytes: [u8; 8] = data
        .get(*pos..*pos + 8)
        .context("unexpected end of compiled-file bundle")?
        .try_into()
        .unwrap();
    *pos += 8;
    Ok(u64::from_le_bytes(bytes))
}

/// Parse the bundle's header section.
pub fn parse_bundle(data: &[u8]) -> Result<Vec<CompiledFileEntry>> {
    let mut pos = 0;
    let count = read_u32(data, &mut pos).context("failed to read file count")?;

    let mut entries = Vec::with_capacity(count as usize);
    for index in 0..count {
        let header_len = read_u32(data, &mut pos)
            .with_context(|| format!("failed to read header {} of {}", index + 1, count))?
            as usize;
        let header_bytes = data
            .get(pos..pos + header_len)
            .with_context(|| format!("truncated header {} of {}", index + 1, count))?;
        pos += header_len;

        let header: CompiledFileHeader = serde_json::from_slice(header_bytes)
            .with_context(|| format!("malformed header {} of {}", index + 1, count))?;

        let payload_offset = read_u64(data, &mut pos)?;
        let payload_len = read_u64(data, &mut pos)?;
        if payload_offset
            .checked_add(payload_len)
            .map_or(true, |end| end > data.len() as u64)
        {
            bail!(
                "payload of `{}` out of bounds ({}+{})",
                header.name,
                payload_offset,
                payload_len
            );
        }

        entries.push(entry_from_header(header, payload_offset, payload_len)?);
    }
    Ok(entries)
}

fn entry_from_header(
    header: CompiledFileHeader,
    payload_offset: u64,
    payload_len: u64,
) -> Result<CompiledFileEntry> {
    let name = ResourceName::parse(&header.name)
        .with_context(|| format!("invalid resource name `{}`", header.name))?;
    let config = ConfigDescription::parse(&header.config)
        .with_context(|| format!("invalid config `{}`", header.config))?;

    let mut exported_symbols = Vec::with_capacity(header.exported_symbols.len());
    for (symbol, line) in header.exported_symbols {
        let symbol_name = ResourceName::parse(&symbol)
            .with_context(|| format!("invalid exported symbol `{}`", symbol))?;
        exported_symbols.push((symbol_name, line));
    }

    Ok(CompiledFileEntry {
        name,
        config,
        source: Source::new(header.source_path),
        exported_symbols,
        payload_offset,
        payload_len,
    })
}

/// Assemble a bundle from headers and payloads. The inverse of
/// [`parse_bundle`]; used by the compile side of the toolchain and by
/// tests here.
pub fn write_bundle(files: &[(CompiledFileHeader, Vec<u8>)]) -> Result<Vec<u8>> {
    let headers: Vec<Vec<u8>> = files
        .iter()
        .map(|(header, _)| serde_json::to_vec(header).context("failed to serialize header"))
        .collect::<Result<_>>()?;

    // Header section size decides where payloads start.
    let mut offset: u64 = 4;
    for header in &headers {
        offset += 4 + header.len() as u64 + 8 + 8;
    }

    let mut out = Vec::new();
    out.extend_from_slice(&(files.len() as u32).to_le_bytes());
    for ((_, payload), header) in files.iter().zip(&headers) {
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(header);
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        offset += payload.len() as u64;
    }
    for (_, payload) in files {
        out.extend_from_slice(payload);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, config: &str) -> CompiledFileHeader {
        CompiledFileHeader {
            name: name.to_string(),
            config: config.to_string(),
            source_path: "res/layout/main.xml".to_string(),
            exported_symbols: vec![("id/button".to_string(), 4)],
        }
    }

    #[test]
    fn test_bundle_round_trip() {
        let bundle = write_bundle(&[
            (header("com.x:layout/main", "default"), b"<xml one>".to_vec()),
            (header("com.x:layout/main", "land"), b"<xml two>".to_vec()),
        ])
        .unwrap();

        let entries = parse_bundle(&bundle).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name.to_string(), "com.x:layout/main");
        assert_eq!(entries[1].config.to_string(), "land");
        assert_eq!(entries[0].exported_symbols[0].0.to_string(), "id/button");

        // Offsets locate the payloads relative to the bundle start.
        let first = &entries[0];
        let payload =
            &bundle[first.payload_offset as usize..(first.payload_offset + first.payload_len) as usize];
        assert_eq!(payload, b"<xml one>");
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = write_bundle(&[]).unwrap();
        assert_eq!(parse_bundle(&bundle).unwrap().len(), 0);
    }

    #[test]
    fn test_truncated_bundle_fails() {
        let mut bundle =
            write_bundle(&[(header("com.x:layout/main", "default"), b"payload".to_vec())]).unwrap();
        bundle.truncate(10);
        assert!(parse_bundle(&bundle).is_err());
    }

    #[test]
    fn test_count_past_end_fails() {
        let bundle = 5u32.to_le_bytes().to_vec();
        assert!(parse_bundle(&bundle).is_err());
    }
}
