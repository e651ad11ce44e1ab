//! Platform reference data
//!
//! Byte order and default work-RAM ranges for the consoles a mapper can
//! target. Mappers that declare no read ranges poll the platform defaults.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order used to decode multi-byte integers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// A block of memory the driver polls every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(deserialize_with = "crate::numbers::deserialize_u32")]
    pub start: u32,
    #[serde(deserialize_with = "crate::numbers::deserialize_u32")]
    pub length: u32,
}

impl ReadRange {
    pub const fn new(start: u32, length: u32) -> Self {
        Self {
            namespace: None,
            start,
            length,
        }
    }

    pub fn namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .unwrap_or(crate::memory::DEFAULT_NAMESPACE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "NES")]
    Nes,
    #[serde(rename = "SNES")]
    Snes,
    #[serde(rename = "GB")]
    Gb,
    #[serde(rename = "GBC")]
    Gbc,
    #[serde(rename = "GBA")]
    Gba,
    #[serde(rename = "NDS")]
    Nds,
    #[serde(rename = "GENESIS", alias = "MEGADRIVE")]
    Genesis,
    #[serde(rename = "PSX")]
    Psx,
}

impl Platform {
    pub fn endian(self) -> Endian {
        match self {
            Platform::Genesis => Endian::Big,
            _ => Endian::Little,
        }
    }

    /// Work-RAM regions polled when a mapper doesn't list its own
    pub fn default_ranges(self) -> Vec<ReadRange> {
        match self {
            Platform::Nes => vec![ReadRange::new(0x0000, 0x0800), ReadRange::new(0x6000, 0x2000)],
            Platform::Snes => vec![ReadRange::new(0x7E_0000, 0x2_0000)],
            // Cartridge RAM, work RAM, high RAM
            Platform::Gb | Platform::Gbc => vec![
                ReadRange::new(0xA000, 0x2000),
                ReadRange::new(0xC000, 0x2000),
                ReadRange::new(0xFF80, 0x007F),
            ],
            Platform::Gba => vec![
                ReadRange::new(0x0200_0000, 0x0004_0000),
                ReadRange::new(0x0300_0000, 0x0000_8000),
            ],
            Platform::Nds => vec![ReadRange::new(0x0200_0000, 0x0040_0000)],
            Platform::Genesis => vec![ReadRange::new(0x00FF_0000, 0x0001_0000)],
            Platform::Psx => vec![ReadRange::new(0x8000_0000, 0x0020_0000)],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Nes => "NES",
            Platform::Snes => "SNES",
            Platform::Gb => "GB",
            Platform::Gbc => "GBC",
            Platform::Gba => "GBA",
            Platform::Nds => "NDS",
            Platform::Genesis => "GENESIS",
            Platform::Psx => "PSX",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
