//! Preset Registry - Fixed Viewport Presets
//!
//! Presets are compiled in. Order is declaration order and never depends on
//! runtime data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown preset: {0}")]
pub struct UnknownPreset(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PresetKey {
    #[serde(rename = "wide1920")]
    Wide1920,
    #[serde(rename = "desktop1440")]
    Desktop1440,
    #[serde(rename = "laptop1200")]
    Laptop1200,
    #[serde(rename = "tablet1024")]
    Tablet1024,
}

impl PresetKey {
    pub const ALL: [PresetKey; 4] = [
        PresetKey::Wide1920,
        PresetKey::Desktop1440,
        PresetKey::Laptop1200,
        PresetKey::Tablet1024,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetKey::Wide1920 => "wide1920",
            PresetKey::Desktop1440 => "desktop1440",
            PresetKey::Laptop1200 => "laptop1200",
            PresetKey::Tablet1024 => "tablet1024",
        }
    }
}

impl fmt::Display for PresetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetKey {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub key: PresetKey,
    /// Representative viewport width in CSS pixels.
    pub stage_width: u32,
    pub label: &'static str,
}

/// Ordered, immutable set of presets.
pub struct PresetRegistry {
    presets: Vec<Preset>,
}

impl PresetRegistry {
    pub fn new() -> Self {
        let presets = PresetKey::ALL
            .into_iter()
            .map(|key| match key {
                PresetKey::Wide1920 => Preset { key, stage_width: 1920, label: "Wide 1920" },
                PresetKey::Desktop1440 => Preset { key, stage_width: 1440, label: "Desktop 1440" },
                PresetKey::Laptop1200 => Preset { key, stage_width: 1200, label: "Laptop 1200" },
                PresetKey::Tablet1024 => Preset { key, stage_width: 1024, label: "Tablet 1024" },
            })
            .collect();
        Self { presets }
    }

    pub fn get(&self, key: PresetKey) -> &Preset {
        // Every key has exactly one entry, in ALL order.
        &self.presets[key as usize]
    }

    pub fn lookup(&self, key: &str) -> Result<&Preset, UnknownPreset> {
        let key: PresetKey = key.parse()?;
        Ok(self.get(key))
    }

    pub fn list(&self) -> &[Preset] {
        &self.presets
    }

    pub fn first(&self) -> &Preset {
        &self.presets[0]
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
