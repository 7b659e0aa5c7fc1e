//! Numeric resource IDs.
//!
//! A `ResourceId` packs (package, type, entry) into the `0xPPTTEEEE`
//! layout used by the resource runtime. Package `0x01` is reserved for
//! the framework (`android`), `0x7f` for applications, and `0x00` means
//! "not yet assigned".

use std::fmt;

use thiserror::Error;

/// Package ID reserved for the framework package.
pub const PACKAGE_FRAMEWORK: u8 = 0x01;

/// Package ID reserved for the application being linked.
pub const PACKAGE_APP: u8 = 0x7f;

/// A packed (package, type, entry) resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceId(pub u32);

/// Error parsing a `0xPPTTEEEE` ID from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid resource ID `{0}`")]
pub struct IdError(String);

impl ResourceId {
    /// Pack an ID from its parts.
    pub fn new(package_id: u8, type_id: u8, entry_id: u16) -> Self {
        ResourceId(((package_id as u32) << 24) | ((type_id as u32) << 16) | entry_id as u32)
    }

    pub fn package_id(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn type_id(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn entry_id(self) -> u16 {
        self.0 as u16
    }

    /// An ID is valid once both its package and type components are set.
    pub fn is_valid(self) -> bool {
        self.package_id() != 0 && self.type_id() != 0
    }

    /// Parse the `0xPPTTEEEE` spelling used in stable-ID files.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| IdError(s.to_string()))?;
        let raw = u32::from_str_radix(hex, 16).map_err(|_| IdError(s.to_string()))?;
        Ok(ResourceId(raw))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
