//! Banner Store - Cache, Session and Save Coalescing
//!
//! The store caches the banner list and settings and owns the single active
//! editing session. State sits behind a mutex that is never held across an
//! `.await`, so editing stays responsive while requests are in flight.
//!
//! Saves are coalesced per (banner, preset): while one `put_crop` is in flight,
//! further saves only replace the queued crop, which goes out once the
//! in-flight request resolves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::api::{ApiError, BannerApi};
use crate::config::EditorConfig;
use crate::geometry::{GeometryError, Handle};
use crate::models::{Banner, BannerId, BannerMetadata, CropRecord, NewBanner, Settings};
use crate::presets::{PresetKey, PresetRegistry};
use crate::session::{EditSession, PendingSave, SessionSnapshot, SessionState};
use crate::upload::{UploadError, UploadFile, UploadValidator};
use crate::validation::{RatioPolicy, ValidationResult, Validator};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Banner {0} has no natural dimensions to crop against")]
    MissingDimensions(BannerId),

    #[error("Crop ratio {ratio:.3} is {deviation:.3} off target")]
    RatioOutOfTolerance { ratio: f64, deviation: f64 },

    #[error("Invalid crop: {0}")]
    InvalidCrop(String),
}

impl StoreError {
    /// True for a stale banner or session reference, local or from the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Api(ApiError::NotFound(_)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// The request went out and the server stored this record.
    Saved(CropRecord),
    /// A save for the same crop was in flight; this one rides behind it.
    Coalesced,
}

#[derive(Default)]
struct SaveSlot {
    queued: Option<PendingSave>,
}

#[derive(Default)]
struct StoreState {
    banners: Vec<Banner>,
    settings: Option<Settings>,
    session: Option<EditSession>,
    next_session_id: u64,
    saves: HashMap<(BannerId, PresetKey), SaveSlot>,
    pending_uploads: Vec<Arc<Notify>>,
}

impl StoreState {
    /// Drop the session and any queued saves for a banner that is gone.
    fn forget_banner(&mut self, id: &BannerId) {
        for ((banner, _), slot) in self.saves.iter_mut() {
            if banner == id {
                slot.queued = None;
            }
        }
        if self.session.as_ref().is_some_and(|s| s.banner_id() == id) {
            self.session = None;
            info!(id = %id, "Closed editing session for removed banner");
        }
    }

    fn session_mut(&mut self) -> Result<&mut EditSession, StoreError> {
        self.session
            .as_mut()
            .ok_or_else(|| StoreError::NotFound("no active editing session".to_string()))
    }
}

pub struct BannerStore {
    api: Arc<dyn BannerApi>,
    config: EditorConfig,
    presets: PresetRegistry,
    uploads: UploadValidator,
    validator: Validator,
    state: Mutex<StoreState>,
}

impl BannerStore {
    pub fn new(api: Arc<dyn BannerApi>, config: EditorConfig) -> Self {
        Self {
            api,
            uploads: UploadValidator::new(config.max_upload_bytes),
            config,
            presets: PresetRegistry::new(),
            validator: Validator::new(),
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    pub fn uploads(&self) -> &UploadValidator {
        &self.uploads
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Banners ---

    /// Refresh the cache from the server, keeping server order.
    pub async fn list(&self) -> Result<Vec<Banner>, StoreError> {
        let banners = self.api.list_banners().await?;
        info!(count = banners.len(), "Loaded banners");

        let mut state = self.state();
        let orphaned = state
            .session
            .as_ref()
            .map(|s| s.banner_id().clone())
            .filter(|id| !banners.iter().any(|b| &b.id == id));
        if let Some(id) = orphaned {
            warn!(id = %id, "Active banner missing from server list");
            state.forget_banner(&id);
        }
        state.banners = banners.clone();
        Ok(banners)
    }

    pub fn banners(&self) -> Vec<Banner> {
        self.state().banners.clone()
    }

    /// Validate, read dimensions, then upload. Nothing is sent if validation fails.
    pub async fn create(
        &self,
        file: UploadFile,
        metadata: BannerMetadata,
    ) -> Result<Banner, StoreError> {
        self.uploads.validate(&file)?;

        let cancel = Arc::new(Notify::new());
        self.state().pending_uploads.push(Arc::clone(&cancel));

        // Cancellation wins over a read that finished in the same poll.
        let natural = tokio::select! {
            biased;
            _ = cancel.notified() => Err(UploadError::Cancelled),
            dims = self.uploads.read_natural_dimensions(&file) => dims,
        };
        self.state().pending_uploads.retain(|p| !Arc::ptr_eq(p, &cancel));
        let natural = natural.map_err(|e| {
            warn!(filename = %file.filename, error = %e, "Upload aborted");
            e
        })?;

        let upload = NewBanner {
            checksum: file.checksum(),
            file,
            metadata,
            natural,
        };
        let banner = self.api.create_banner(&upload).await?;
        info!(id = %banner.id, mime = %banner.mime_type, size = banner.size, "Created banner");

        self.state().banners.insert(0, banner.clone());
        Ok(banner)
    }

    /// Abort every dimension read that has not finished. Returns whether any was pending.
    pub fn cancel_pending_upload(&self) -> bool {
        let pending = std::mem::take(&mut self.state().pending_uploads);
        for cancel in &pending {
            cancel.notify_one();
        }
        if !pending.is_empty() {
            debug!(count = pending.len(), "Cancelled pending uploads");
        }
        !pending.is_empty()
    }

    pub async fn delete(&self, id: &BannerId) -> Result<(), StoreError> {
        self.api.delete_banner(id).await?;

        let mut state = self.state();
        state.banners.retain(|b| &b.id != id);
        state.forget_banner(id);
        info!(id = %id, "Deleted banner");
        Ok(())
    }

    // --- Settings ---

    pub async fn get_settings(&self) -> Result<Settings, StoreError> {
        let settings = self.api.get_settings().await?;
        self.state().settings = Some(settings.clone());
        Ok(settings)
    }

    pub async fn update_settings(&self, payload: Settings) -> Result<Settings, StoreError> {
        payload.check().map_err(|e| StoreError::Api(ApiError::Rejected(e)))?;
        let settings = self.api.update_settings(&payload).await?;
        info!(?settings, "Updated banner settings");
        self.state().settings = Some(settings.clone());
        Ok(settings)
    }

    pub fn cached_settings(&self) -> Option<Settings> {
        self.state().settings.clone()
    }

    // --- Session ---

    /// Open a session on `id` at the first preset. Replaces any current session.
    pub async fn select_banner(&self, id: &BannerId) -> Result<SessionSnapshot, StoreError> {
        self.cancel_pending_upload();

        let lookup = |state: &StoreState| {
            state
                .banners
                .iter()
                .find(|b| &b.id == id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("banner {}", id)))
        };
        let banner = lookup(&*self.state())?;
        let natural = banner
            .natural()
            .ok_or_else(|| StoreError::MissingDimensions(id.clone()))?;

        let crops = self.api.fetch_crops(id).await?;

        let mut state = self.state();
        // The banner may have been deleted while crops were loading.
        let banner = lookup(&*state)?;
        let session_id = state.next_session_id;
        state.next_session_id += 1;

        let preset = self.presets.first().key;
        let session = EditSession::open(session_id, banner, natural, crops, preset, &self.config)?;
        let snapshot = session.snapshot(&self.config);
        if let Some(old) = state.session.replace(session) {
            if old.has_unsaved_changes() {
                debug!(banner = %old.banner_id(), "Discarded unsaved edits");
            }
        }
        info!(banner = %id, session = session_id, "Opened editing session");
        Ok(snapshot)
    }

    pub fn select_preset(&self, preset: PresetKey) -> Result<SessionSnapshot, StoreError> {
        let mut state = self.state();
        let session = state.session_mut()?;
        if session.has_unsaved_changes() {
            debug!(preset = %session.preset(), "Discarded unsaved edits");
        }
        session.select_preset(preset, &self.config)?;
        Ok(session.snapshot(&self.config))
    }

    pub fn mutate_box(&self, handle: Handle, dx: f64, dy: f64) -> Result<SessionSnapshot, StoreError> {
        let mut state = self.state();
        let session = state.session_mut()?;
        session.mutate(handle, dx, dy);
        Ok(session.snapshot(&self.config))
    }

    pub fn reset_box(&self) -> Result<SessionSnapshot, StoreError> {
        let mut state = self.state();
        let session = state.session_mut()?;
        session.reset(&self.config)?;
        Ok(session.snapshot(&self.config))
    }

    pub fn ratio_check(&self) -> Result<ValidationResult, StoreError> {
        let mut state = self.state();
        let session = state.session_mut()?;
        Ok(self.validator.validate(&session.crop_input(), &self.config))
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.state().session.as_ref().map(|s| s.snapshot(&self.config))
    }

    pub fn session_state(&self) -> SessionState {
        self.state()
            .session
            .as_ref()
            .map_or(SessionState::Idle, |s| s.state().clone())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.state().session.as_ref().is_some_and(|s| s.has_unsaved_changes())
    }

    /// Persist the current crop.
    pub async fn save_crop(&self) -> Result<SaveOutcome, StoreError> {
        let (key, mut save) = {
            let mut state = self.state();
            let session = state.session_mut()?;

            let check = self.validator.validate(&session.crop_input(), &self.config);
            if check.out_of_tolerance && self.config.ratio_policy == RatioPolicy::Block {
                return Err(StoreError::RatioOutOfTolerance {
                    ratio: check.ratio,
                    deviation: check.deviation,
                });
            }
            if !check.valid {
                let messages: Vec<_> = check.violations.iter()
                    .map(|v| format!("{}: {}", v.rule, v.message))
                    .collect();
                return Err(StoreError::InvalidCrop(messages.join("; ")));
            }

            let save = session.begin_save();
            let key = (save.banner_id.clone(), save.preset);
            if let Some(slot) = state.saves.get_mut(&key) {
                debug!(banner = %key.0, preset = %key.1, "Queued save behind in-flight request");
                slot.queued = Some(save);
                return Ok(SaveOutcome::Coalesced);
            }
            state.saves.insert(key.clone(), SaveSlot::default());
            (key, save)
        };

        loop {
            debug!(banner = %save.banner_id, preset = %save.preset, rect = ?save.crop.natural, "Saving crop");
            let result = self.api.put_crop(&save.banner_id, save.preset, &save.crop).await;

            let mut state = self.state();
            let queued = state.saves.get_mut(&key).and_then(|slot| slot.queued.take());
            if queued.is_none() || result.is_err() {
                state.saves.remove(&key);
            }

            match result {
                Ok(record) => {
                    if let Some(session) = state.session.as_mut().filter(|s| s.id() == save.session_id) {
                        session.finish_save(&save, record.clone(), queued.is_some());
                    }
                    match queued {
                        Some(next) => save = next,
                        None => {
                            info!(banner = %key.0, preset = %key.1, revision = %record.revision, "Saved crop");
                            return Ok(SaveOutcome::Saved(record));
                        }
                    }
                }
                Err(e) => {
                    warn!(banner = %key.0, preset = %key.1, error = %e, "Crop save failed");
                    // A queued crop is not sent; the load it came from fails with this one.
                    let message = e.to_string();
                    for failed in std::iter::once(&save).chain(queued.as_ref()) {
                        if let Some(session) =
                            state.session.as_mut().filter(|s| s.id() == failed.session_id)
                        {
                            session.fail_save(failed, message.clone());
                        }
                    }
                    return Err(e.into());
                }
            }
        }
    }
}
