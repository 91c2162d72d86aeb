//! In-Memory Banner Server
//!
//! Implements `BannerApi` with the same semantics as the REST backend:
//! newest banners first, crops upserted on (banner, preset), crops deleted
//! with their banner. Backs the store tests and local runs without a server.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::api::{ApiError, BannerApi, CropMap};
use crate::geometry::CropRect;
use crate::hashing::crop_fingerprint;
use crate::models::{Banner, BannerId, CropRecord, NewBanner, Settings};
use crate::presets::PresetKey;

#[derive(Default)]
struct ServerState {
    banners: Vec<Banner>,
    crops: HashMap<(BannerId, PresetKey), CropRecord>,
    settings: Settings,
}

#[derive(Default)]
pub struct InMemoryBannerApi {
    state: Mutex<ServerState>,
    put_calls: AtomicUsize,
    fail_puts: AtomicBool,
    put_gate: Option<Arc<Semaphore>>,
}

impl InMemoryBannerApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `put_crop` waits for one permit from `gate` before it lands.
    pub fn with_put_gate(gate: Arc<Semaphore>) -> Self {
        Self {
            put_gate: Some(gate),
            ..Self::default()
        }
    }

    /// Seed a banner without going through upload.
    pub fn insert_banner(&self, banner: Banner) {
        self.state().banners.insert(0, banner);
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent `put_crop` calls fail with a network error.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn stored_crop(&self, id: &BannerId, preset: PresetKey) -> Option<CropRecord> {
        self.state().crops.get(&(id.clone(), preset)).cloned()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl BannerApi for InMemoryBannerApi {
    async fn list_banners(&self) -> Result<Vec<Banner>, ApiError> {
        Ok(self.state().banners.clone())
    }

    async fn create_banner(&self, upload: &NewBanner) -> Result<Banner, ApiError> {
        let id = BannerId(Uuid::new_v4().to_string());
        let banner = Banner {
            url: format!("/uploads/{}/{}", id, upload.file.filename),
            id,
            mime_type: upload.file.mime_type.clone(),
            size: upload.file.size(),
            created_at: Utc::now(),
            natural_width: upload.natural.map(|d| d.width),
            natural_height: upload.natural.map(|d| d.height),
            active: upload.metadata.active,
            title: upload.metadata.title.clone(),
            link_url: upload.metadata.link_url.clone(),
            checksum: Some(upload.checksum.clone()),
        };
        self.state().banners.insert(0, banner.clone());
        Ok(banner)
    }

    async fn delete_banner(&self, id: &BannerId) -> Result<(), ApiError> {
        let mut state = self.state();
        let before = state.banners.len();
        state.banners.retain(|b| &b.id != id);
        if state.banners.len() == before {
            return Err(ApiError::NotFound(format!("/api/banners/{}", id)));
        }
        state.crops.retain(|(banner, _), _| banner != id);
        Ok(())
    }

    async fn get_settings(&self) -> Result<Settings, ApiError> {
        Ok(self.state().settings.clone())
    }

    async fn update_settings(&self, settings: &Settings) -> Result<Settings, ApiError> {
        settings.check().map_err(ApiError::Rejected)?;
        let mut state = self.state();
        state.settings = settings.clone();
        Ok(state.settings.clone())
    }

    async fn fetch_crops(&self, id: &BannerId) -> Result<CropMap, ApiError> {
        let state = self.state();
        if !state.banners.iter().any(|b| &b.id == id) {
            return Err(ApiError::NotFound(format!("/api/banners/{}/crops", id)));
        }
        Ok(state
            .crops
            .iter()
            .filter(|((banner, _), _)| banner == id)
            .map(|((_, preset), record)| (*preset, record.clone()))
            .collect())
    }

    async fn put_crop(
        &self,
        id: &BannerId,
        preset: PresetKey,
        crop: &CropRect,
    ) -> Result<CropRecord, ApiError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.put_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ApiError::Network("server closed".to_string()))?;
            permit.forget();
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection reset".to_string()));
        }

        let mut state = self.state();
        let banner = state
            .banners
            .iter()
            .find(|b| &b.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("/api/banners/{}/crop", id)))?;

        if crop.natural.is_degenerate() {
            return Err(ApiError::Rejected("crop box has zero area".to_string()));
        }
        if let Some(natural) = banner.natural() {
            if !crop.natural.fits_within(natural) {
                return Err(ApiError::Rejected("crop box extends past the image".to_string()));
            }
        }

        let revision = crop_fingerprint(id.as_str(), preset.as_str(), &crop.natural)
            .map_err(|e| ApiError::Rejected(e.to_string()))?;
        let key = (id.clone(), preset);

        // Identical upserts leave the stored record untouched.
        if let Some(existing) = state.crops.get(&key) {
            if existing.revision == revision {
                return Ok(existing.clone());
            }
        }

        let record = CropRecord {
            preset_key: preset,
            rect: crop.natural,
            normalized: crop.normalized,
            revision,
            updated_at: Utc::now(),
        };
        state.crops.insert(key, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Dimensions, NaturalRect};
    use crate::upload::UploadFile;

    async fn seeded() -> (InMemoryBannerApi, BannerId) {
        let api = InMemoryBannerApi::new();
        let file = UploadFile::new("hero.png", "image/png", vec![0; 16]);
        let banner = api
            .create_banner(&NewBanner {
                checksum: file.checksum(),
                file,
                metadata: Default::default(),
                natural: Some(Dimensions::new(1920, 1080)),
            })
            .await
            .unwrap();
        (api, banner.id)
    }

    fn crop(left: u32) -> CropRect {
        let natural = NaturalRect { left, top: 156, width: 1000, height: 400 };
        CropRect { natural, normalized: natural.normalized(Dimensions::new(1920, 1080)) }
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let (api, id) = seeded().await;

        let first = api.put_crop(&id, PresetKey::Wide1920, &crop(10)).await.unwrap();
        let second = api.put_crop(&id, PresetKey::Wide1920, &crop(10)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.fetch_crops(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_upserts() {
        let (api, id) = seeded().await;

        api.put_crop(&id, PresetKey::Wide1920, &crop(10)).await.unwrap();
        api.put_crop(&id, PresetKey::Wide1920, &crop(20)).await.unwrap();
        let crops = api.fetch_crops(&id).await.unwrap();
        assert_eq!(crops[&PresetKey::Wide1920].rect.left, 20);
    }

    #[tokio::test]
    async fn test_put_rejects_out_of_bounds() {
        let (api, id) = seeded().await;
        let err = api.put_crop(&id, PresetKey::Wide1920, &crop(1000)).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (api, id) = seeded().await;
        api.put_crop(&id, PresetKey::Tablet1024, &crop(0)).await.unwrap();

        api.delete_banner(&id).await.unwrap();
        assert!(api.stored_crop(&id, PresetKey::Tablet1024).is_none());
        assert!(matches!(api.fetch_crops(&id).await, Err(ApiError::NotFound(_))));
        assert!(matches!(api.delete_banner(&id).await, Err(ApiError::NotFound(_))));
    }
}
