//! Bannercrop Core - Per-Preset Crop Editing for Banner Media
//!
//! # Ground Rules
//! 1. Only rectangle coordinates are persisted, never pixels
//! 2. One crop per (banner, preset); absence means never edited
//! 3. Stage and natural spaces share one uniform scale
//! 4. Validation runs before any request leaves
//! 5. One editing session at a time, one save in flight per crop

pub mod api;
pub mod commands;
pub mod config;
pub mod geometry;
pub mod hashing;
pub mod memory;
pub mod models;
pub mod presets;
pub mod session;
pub mod store;
pub mod upload;
pub mod validation;

pub use api::{ApiError, BannerApi, HttpBannerApi, HttpTransport};
pub use commands::{Command, Dispatcher, Reply};
pub use config::{ConfigError, EditorConfig};
pub use geometry::{CropGeometry, CropRect, Dimensions, Handle, NaturalRect, NormalizedRect, StageBox};
pub use memory::InMemoryBannerApi;
pub use models::{Banner, BannerId, BannerMetadata, CropRecord, Settings};
pub use presets::{Preset, PresetKey, PresetRegistry};
pub use session::{SessionSnapshot, SessionState};
pub use store::{BannerStore, SaveOutcome, StoreError};
pub use upload::{UploadError, UploadFile, UploadValidator};
pub use validation::{RatioPolicy, ValidationResult, Validator};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STAGE_WIDTH: f64 = 720.0;
pub const STAGE_HEIGHT: f64 = 280.0;
pub const TARGET_RATIO: f64 = 2.5;
pub const RATIO_TOLERANCE: f64 = 0.15;
pub const MIN_BOX_SIZE: f64 = 8.0;
pub const MAX_UPLOAD_BYTES: u64 = 64 * 1024 * 1024;
