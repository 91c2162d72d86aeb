//! Editing Session
//!
//! One session per selected banner. It owns the geometry for the selected
//! preset, the crops already saved for the banner, and the save state machine:
//!
//! `Loaded -> Dirty -> Saving -> Loaded`, or `Saving -> Failed` with the edits
//! kept for a retry. No session at all is `Idle`.

use serde::Serialize;

use crate::api::CropMap;
use crate::config::EditorConfig;
use crate::geometry::{CropGeometry, CropRect, Dimensions, GeometryError, Handle, StageBox};
use crate::models::{Banner, BannerId, CropRecord};
use crate::presets::PresetKey;
use crate::validation::{ratio_deviation, within_tolerance, CropInput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Loaded,
    Dirty,
    Saving,
    Failed { error: String },
}

/// A save taken from the session, waiting to go out.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    pub session_id: u64,
    pub load_id: u64,
    pub revision: u64,
    pub banner_id: BannerId,
    pub preset: PresetKey,
    pub crop: CropRect,
}

/// Read-only view handed to callers after every command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub banner_id: BannerId,
    pub preset: PresetKey,
    #[serde(flatten)]
    pub state: SessionState,
    pub stage_box: StageBox,
    pub display: (f64, f64),
    pub crop: CropRect,
    pub ratio: f64,
    pub deviation: f64,
    pub out_of_tolerance: bool,
    pub unsaved_changes: bool,
    pub saved_presets: Vec<PresetKey>,
}

#[derive(Debug, Clone)]
pub struct EditSession {
    id: u64,
    banner: Banner,
    natural: Dimensions,
    crops: CropMap,
    preset: PresetKey,
    geometry: CropGeometry,
    state: SessionState,
    load_id: u64,
    revision: u64,
    saved_revision: u64,
}

fn fresh_geometry(
    natural: Dimensions,
    crops: &CropMap,
    preset: PresetKey,
    config: &EditorConfig,
) -> Result<CropGeometry, GeometryError> {
    let mut geometry = CropGeometry::new(
        natural,
        config.stage_width,
        config.stage_height,
        config.target_ratio,
        config.min_box_size,
    )?;
    if let Some(record) = crops.get(&preset) {
        geometry.load_natural(&record.rect);
    }
    Ok(geometry)
}

impl EditSession {
    /// Open on `preset`, seeded from its saved crop if there is one.
    pub fn open(
        id: u64,
        banner: Banner,
        natural: Dimensions,
        crops: CropMap,
        preset: PresetKey,
        config: &EditorConfig,
    ) -> Result<Self, GeometryError> {
        let geometry = fresh_geometry(natural, &crops, preset, config)?;
        Ok(Self {
            id,
            banner,
            natural,
            crops,
            preset,
            geometry,
            state: SessionState::Loaded,
            load_id: 0,
            revision: 0,
            saved_revision: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn banner(&self) -> &Banner {
        &self.banner
    }

    pub fn banner_id(&self) -> &BannerId {
        &self.banner.id
    }

    pub fn preset(&self) -> PresetKey {
        self.preset
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn geometry(&self) -> &CropGeometry {
        &self.geometry
    }

    pub fn crops(&self) -> &CropMap {
        &self.crops
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// Switch preset. Unsaved edits on the current preset are dropped.
    pub fn select_preset(&mut self, preset: PresetKey, config: &EditorConfig) -> Result<(), GeometryError> {
        self.geometry = fresh_geometry(self.natural, &self.crops, preset, config)?;
        self.preset = preset;
        self.load_id += 1;
        self.revision = 0;
        self.saved_revision = 0;
        self.state = SessionState::Loaded;
        Ok(())
    }

    pub fn mutate(&mut self, handle: Handle, dx: f64, dy: f64) {
        let before = self.geometry.current();
        self.geometry.move_or_resize(handle, dx, dy);
        if self.geometry.current() != before {
            self.mark_edited();
        }
    }

    /// Put the default box for the preset back, ignoring any saved crop.
    pub fn reset(&mut self, config: &EditorConfig) -> Result<(), GeometryError> {
        let fresh = fresh_geometry(self.natural, &CropMap::new(), self.preset, config)?;
        if fresh.current() != self.geometry.current() {
            self.geometry = fresh;
            self.mark_edited();
        }
        Ok(())
    }

    fn mark_edited(&mut self) {
        self.revision += 1;
        // An in-flight save settles the state when it resolves.
        if self.state != SessionState::Saving {
            self.state = SessionState::Dirty;
        }
    }

    pub fn crop_input(&self) -> CropInput {
        CropInput {
            preset: self.preset,
            natural: self.natural,
            rect: self.geometry.to_natural_rect().natural,
            ratio: self.geometry.current_ratio(),
        }
    }

    pub fn begin_save(&mut self) -> PendingSave {
        self.state = SessionState::Saving;
        PendingSave {
            session_id: self.id,
            load_id: self.load_id,
            revision: self.revision,
            banner_id: self.banner.id.clone(),
            preset: self.preset,
            crop: self.geometry.to_natural_rect(),
        }
    }

    fn is_current(&self, save: &PendingSave) -> bool {
        save.session_id == self.id && save.load_id == self.load_id && save.preset == self.preset
    }

    /// Apply a successful save. `more_queued` keeps the session in `Saving`.
    pub fn finish_save(&mut self, save: &PendingSave, record: CropRecord, more_queued: bool) {
        self.crops.insert(save.preset, record);
        if !self.is_current(save) {
            return;
        }
        self.saved_revision = self.saved_revision.max(save.revision);
        self.state = if more_queued {
            SessionState::Saving
        } else if self.has_unsaved_changes() {
            SessionState::Dirty
        } else {
            SessionState::Loaded
        };
    }

    pub fn fail_save(&mut self, save: &PendingSave, error: String) {
        if self.is_current(save) {
            self.state = SessionState::Failed { error };
        }
    }

    pub fn snapshot(&self, config: &EditorConfig) -> SessionSnapshot {
        let ratio = self.geometry.current_ratio();
        let deviation = ratio_deviation(ratio, config.target_ratio);
        SessionSnapshot {
            banner_id: self.banner.id.clone(),
            preset: self.preset,
            state: self.state.clone(),
            stage_box: self.geometry.current(),
            display: self.geometry.display(),
            crop: self.geometry.to_natural_rect(),
            ratio,
            deviation,
            out_of_tolerance: !within_tolerance(deviation, config.ratio_tolerance),
            unsaved_changes: self.has_unsaved_changes(),
            saved_presets: self.crops.keys().copied().collect(),
        }
    }
}
