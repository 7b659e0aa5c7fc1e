//! Configuration qualifiers.
//!
//! A `ConfigDescription` names the device configuration a resource value
//! targets: locale, orientation, density, screen size, and SDK version.
//! The all-zero value is the default configuration that matches any
//! device. Qualifiers parse from the dash-separated form used in
//! resource directory names (`en-rUS-land-hdpi-v21`).

use std::fmt;

use thiserror::Error;

/// Axis bits returned by [`ConfigDescription::diff`].
pub const CONFIG_LOCALE: u32 = 1 << 0;
pub const CONFIG_ORIENTATION: u32 = 1 << 1;
pub const CONFIG_DENSITY: u32 = 1 << 2;
pub const CONFIG_SCREEN_SIZE: u32 = 1 << 3;
pub const CONFIG_VERSION: u32 = 1 << 4;

/// Screen orientation qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Orientation {
    #[default]
    Any,
    Portrait,
    Landscape,
}

/// Screen size bucket qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ScreenSize {
    #[default]
    Any,
    Small,
    Normal,
    Large,
    Xlarge,
}

/// Named density buckets, stored as dpi values.
const DENSITIES: &[(&str, u16)] = &[
    ("ldpi", 120),
    ("mdpi", 160),
    ("tvdpi", 213),
    ("hdpi", 240),
    ("xhdpi", 320),
    ("xxhdpi", 480),
    ("xxxhdpi", 640),
    ("nodpi", 0xffff),
    ("anydpi", 0xfffe),
];

/// A device configuration along the axes the linker cares about.
///
/// The derived `Ord` gives the total ordering used for tie-breaks in
/// deterministic output; `default()` is the all-zero configuration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConfigDescription {
    /// BCP-47-ish language code, lowercase two letters, or empty.
    pub language: String,
    /// Region code, uppercase two letters, or empty.
    pub region: String,
    pub orientation: Orientation,
    /// Density in dpi; 0 means unspecified.
    pub density: u16,
    pub screen_size: ScreenSize,
    /// Minimum SDK level this value targets; 0 means unspecified.
    pub sdk_version: u16,
}

/// Error parsing a configuration qualifier string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid config qualifier `{0}`")]
pub struct ConfigError(String);

impl ConfigDescription {
    /// Parse a dash-separated qualifier string. `"default"` and the empty
    /// string yield the default configuration.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let mut config = ConfigDescription::default();
        if s.is_empty() || s == "default" {
            return Ok(config);
        }

        for part in s.split('-') {
            if !config.parse_qualifier(part) {
                return Err(ConfigError(s.to_string()));
            }
        }
        Ok(config)
    }

    fn parse_qualifier(&mut self, part: &str) -> bool {
        match part {
            "port" => {
                self.orientation = Orientation::Portrait;
                return true;
            }
            "land" => {
                self.orientation = Orientation::Landscape;
                return true;
            }
            "small" => {
                self.screen_size = ScreenSize::Small;
                return true;
            }
            "normal" => {
                self.screen_size = ScreenSize::Normal;
                return true;
            }
            "large" => {
                self.screen_size = ScreenSize::Large;
                return true;
            }
            "xlarge" => {
                self.screen_size = ScreenSize::Xlarge;
                return true;
            }
            _ => {}
        }

        if let Some((_, dpi)) = DENSITIES.iter().find(|(name, _)| *name == part) {
            self.density = *dpi;
            return true;
        }
        if let Some(dpi) = part
            .strip_suffix("dpi")
            .and_then(|n| n.parse::<u16>().ok())
        {
            self.density = dpi;
            return true;
        }

        if let Some(v) = part.strip_prefix('v').and_then(|n| n.parse::<u16>().ok()) {
            if v > 0 {
                self.sdk_version = v;
                return true;
            }
            return false;
        }

        if let Some(region) = part.strip_prefix('r') {
            if !self.language.is_empty()
                && region.len() == 2
                && region.chars().all(|c| c.is_ascii_alphabetic())
            {
                self.region = region.to_uppercase();
                return true;
            }
        }

        if part.len() == 2 && part.chars().all(|c| c.is_ascii_lowercase()) {
            self.language = part.to_string();
            return true;
        }

        false
    }

    /// Whether this is the default (all-zero) configuration.
    pub fn is_default(&self) -> bool {
        *self == ConfigDescription::default()
    }

    /// Bitset of axes on which `self` and `other` differ.
    pub fn diff(&self, other: &ConfigDescription) -> u32 {
        let mut bits = 0;
        if self.language != other.language || self.region != other.region {
            bits |= CONFIG_LOCALE;
        }
        if self.orientation != other.orientation {
            bits |= CONFIG_ORIENTATION;
        }
        if self.density != other.density {
            bits |= CONFIG_DENSITY;
        }
        if self.screen_size != other.screen_size {
            bits |= CONFIG_SCREEN_SIZE;
        }
        if self.sdk_version != other.sdk_version {
            bits |= CONFIG_VERSION;
        }
        bits
    }

    /// This configuration with the SDK version axis cleared.
    pub fn without_sdk_version(&self) -> ConfigDescription {
        let mut copy = self.clone();
        copy.sdk_version = 0;
        copy
    }

    /// This configuration with the SDK version axis replaced.
    pub fn with_sdk_version(&self, sdk: u16) -> ConfigDescription {
        let mut copy = self.clone();
        copy.sdk_version = sdk;
        copy
    }
}

impl fmt::Display for ConfigDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            return f.write_str("default");
        }

        let mut parts: Vec<String> = Vec::new();
        if !self.language.is_empty() {
            parts.push(self.language.clone());
            if !self.region.is_empty() {
                parts.push(format!("r{}", self.region));
            }
        }
        match self.orientation {
            Orientation::Any => {}
            Orientation::Portrait => parts.push("port".into()),
            Orientation::Landscape => parts.push("land".into()),
        }
        match self.screen_size {
            ScreenSize::Any => {}
            ScreenSize::Small => parts.push("small".into()),
            ScreenSize::Normal => parts.push("normal".into()),
            ScreenSize::Large => parts.push("large".into()),
            ScreenSize::Xlarge => parts.push("xlarge".into()),
        }
        if self.density != 0 {
            match DENSITIES.iter().find(|(_, dpi)| *dpi == self.density) {
                Some((name, _)) => parts.push((*name).into()),
                None => parts.push(format!("{}dpi", self.density)),
            }
        }
        if self.sdk_version != 0 {
            parts.push(format!("v{}", self.sdk_version));
        }
        f.write_str(&parts.join("-"))
    }
}
