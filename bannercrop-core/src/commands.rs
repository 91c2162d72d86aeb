//! Command Dispatch - Single Entry Point
//!
//! Presentation layers translate their events into `Command`s; every state
//! change in the store goes through `Dispatcher::dispatch`.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::geometry::Handle;
use crate::models::{Banner, BannerId, BannerMetadata, Settings};
use crate::presets::PresetKey;
use crate::session::SessionSnapshot;
use crate::store::{BannerStore, SaveOutcome, StoreError};
use crate::upload::UploadFile;

#[derive(Debug, Clone)]
pub enum Command {
    LoadBanners,
    Upload { file: UploadFile, metadata: BannerMetadata },
    DeleteBanner(BannerId),
    LoadSettings,
    SaveSettings(Settings),
    SelectBanner(BannerId),
    SelectPreset(PresetKey),
    MutateBox { handle: Handle, dx: f64, dy: f64 },
    ResetBox,
    SaveCrop,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::LoadBanners => "load_banners",
            Command::Upload { .. } => "upload",
            Command::DeleteBanner(_) => "delete_banner",
            Command::LoadSettings => "load_settings",
            Command::SaveSettings(_) => "save_settings",
            Command::SelectBanner(_) => "select_banner",
            Command::SelectPreset(_) => "select_preset",
            Command::MutateBox { .. } => "mutate_box",
            Command::ResetBox => "reset_box",
            Command::SaveCrop => "save_crop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Reply {
    Banners(Vec<Banner>),
    Created(Banner),
    Deleted(BannerId),
    Settings(Settings),
    Session(SessionSnapshot),
    /// Snapshot after the save settled; `saved` is false when it was coalesced.
    CropSaved { saved: bool, session: Option<SessionSnapshot> },
}

pub struct Dispatcher {
    store: Arc<BannerStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<BannerStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &BannerStore {
        &self.store
    }

    pub async fn dispatch(&self, command: Command) -> Result<Reply, StoreError> {
        debug!(command = command.name(), "Dispatching");
        let store = &self.store;

        match command {
            Command::LoadBanners => Ok(Reply::Banners(store.list().await?)),
            Command::Upload { file, metadata } => {
                Ok(Reply::Created(store.create(file, metadata).await?))
            }
            Command::DeleteBanner(id) => {
                store.delete(&id).await?;
                Ok(Reply::Deleted(id))
            }
            Command::LoadSettings => Ok(Reply::Settings(store.get_settings().await?)),
            Command::SaveSettings(payload) => {
                Ok(Reply::Settings(store.update_settings(payload).await?))
            }
            Command::SelectBanner(id) => Ok(Reply::Session(store.select_banner(&id).await?)),
            Command::SelectPreset(preset) => Ok(Reply::Session(store.select_preset(preset)?)),
            Command::MutateBox { handle, dx, dy } => {
                Ok(Reply::Session(store.mutate_box(handle, dx, dy)?))
            }
            Command::ResetBox => Ok(Reply::Session(store.reset_box()?)),
            Command::SaveCrop => {
                let outcome = store.save_crop().await?;
                Ok(Reply::CropSaved {
                    saved: matches!(outcome, SaveOutcome::Saved(_)),
                    session: store.snapshot(),
                })
            }
        }
    }
}
