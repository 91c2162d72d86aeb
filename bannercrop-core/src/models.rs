//! Wire Models - Validated Records at the API Boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{Dimensions, NaturalRect, NormalizedRect};
use crate::presets::PresetKey;
use crate::upload::{media_kind, MediaKind, UploadFile};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BannerId(pub String);

impl BannerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BannerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BannerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Banner {
    pub id: BannerId,
    pub url: String,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub natural_width: Option<u32>,
    #[serde(default)]
    pub natural_height: Option<u32>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

fn default_true() -> bool { true }

impl Banner {
    pub fn natural(&self) -> Option<Dimensions> {
        match (self.natural_width, self.natural_height) {
            (Some(w), Some(h)) => Some(Dimensions::new(w, h)),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        media_kind(&self.mime_type)
    }

    /// Shape checks serde cannot express.
    pub fn check(&self) -> Result<(), String> {
        if self.id.0.is_empty() {
            return Err("banner id is empty".to_string());
        }
        match (self.natural_width, self.natural_height) {
            (Some(0), _) | (_, Some(0)) => {
                Err(format!("banner {} has a zero natural dimension", self.id))
            }
            (Some(_), None) | (None, Some(_)) => {
                Err(format!("banner {} has only one natural dimension", self.id))
            }
            _ => Ok(()),
        }
    }
}

/// Optional fields sent alongside an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for BannerMetadata {
    fn default() -> Self {
        Self { title: None, link_url: None, active: true }
    }
}

/// A validated upload ready for `POST /api/banners`.
#[derive(Debug, Clone)]
pub struct NewBanner {
    pub file: UploadFile,
    pub metadata: BannerMetadata,
    pub natural: Option<Dimensions>,
    pub checksum: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transition {
    #[default]
    Fade,
    Slide,
    None,
}

/// Banner-wide display options. There is exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub autoplay: bool,
    pub rotation_interval_ms: u32,
    #[serde(default)]
    pub transition: Transition,
    #[serde(default)]
    pub pause_on_hover: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            autoplay: true,
            rotation_interval_ms: 5000,
            transition: Transition::Fade,
            pause_on_hover: true,
        }
    }
}

impl Settings {
    pub fn check(&self) -> Result<(), String> {
        if self.autoplay && self.rotation_interval_ms == 0 {
            return Err("rotationIntervalMs must be positive when autoplay is on".to_string());
        }
        Ok(())
    }
}

/// A persisted crop for one (banner, preset).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropRecord {
    pub preset_key: PresetKey,
    #[serde(rename = "box")]
    pub rect: NaturalRect,
    pub normalized: NormalizedRect,
    pub revision: String,
    pub updated_at: DateTime<Utc>,
}

impl CropRecord {
    pub fn check(&self) -> Result<(), String> {
        if self.rect.is_degenerate() {
            return Err(format!("crop {} has zero area", self.preset_key));
        }
        let n = &self.normalized;
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(n.x) && in_unit(n.y) && in_unit(n.width) && in_unit(n.height)) {
            return Err(format!("crop {} has fractions outside [0, 1]", self.preset_key));
        }
        Ok(())
    }
}

/// Body of `PUT /api/banners/{id}/crop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropPut {
    pub preset_key: PresetKey,
    #[serde(rename = "box")]
    pub rect: NaturalRect,
    pub normalized: NormalizedRect,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_banner_defaults() {
        let banner: Banner = serde_json::from_value(json!({
            "id": "b1",
            "url": "/uploads/b1/hero.png",
            "mimeType": "image/png",
            "size": 1024,
            "createdAt": "2026-01-02T03:04:05Z",
            "naturalWidth": 1920,
            "naturalHeight": 1080
        }))
        .unwrap();

        assert!(banner.active);
        assert_eq!(banner.natural(), Some(Dimensions::new(1920, 1080)));
        assert_eq!(banner.kind(), Some(MediaKind::Image));
        assert!(banner.check().is_ok());
    }

    #[test]
    fn test_banner_half_dimensions_rejected() {
        let banner: Banner = serde_json::from_value(json!({
            "id": "b1",
            "url": "/uploads/b1/hero.png",
            "mimeType": "image/png",
            "size": 1024,
            "createdAt": "2026-01-02T03:04:05Z",
            "naturalWidth": 1920
        }))
        .unwrap();
        assert!(banner.check().unwrap_err().contains("one natural dimension"));
    }

    #[test]
    fn test_crop_put_wire_shape() {
        let body = CropPut {
            preset_key: PresetKey::Tablet1024,
            rect: NaturalRect { left: 0, top: 156, width: 1920, height: 768 },
            normalized: NaturalRect { left: 0, top: 156, width: 1920, height: 768 }
                .normalized(Dimensions::new(1920, 1080)),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["presetKey"], "tablet1024");
        assert_eq!(value["box"]["top"], 156);
    }

    #[test]
    fn test_settings_check() {
        let mut settings = Settings::default();
        assert!(settings.check().is_ok());
        settings.rotation_interval_ms = 0;
        assert!(settings.check().is_err());
        settings.autoplay = false;
        assert!(settings.check().is_ok());
    }
}
