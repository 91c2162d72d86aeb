//! Crop Geometry - Stage/Natural Coordinate Engine
//!
//! The stage is a fixed editing frame. The image is fitted inside it at a
//! single uniform scale; the crop box lives in that fitted "display" area.
//! Persisted rectangles are in natural image pixels.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Image has zero dimension: {0}x{1}")]
    ZeroDimensions(u32, u32),

    #[error("Stage has invalid dimension: {0}x{1}")]
    InvalidStage(f64, f64),

    #[error("Target ratio must be positive, got {0}")]
    InvalidRatio(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Crop box in stage pixels. Only exists while editing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl StageBox {
    pub fn ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// Crop box in natural image pixels. This is what gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NaturalRect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl NaturalRect {
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_within(&self, natural: Dimensions) -> bool {
        self.left as u64 + self.width as u64 <= natural.width as u64
            && self.top as u64 + self.height as u64 <= natural.height as u64
    }

    pub fn normalized(&self, natural: Dimensions) -> NormalizedRect {
        let w = natural.width as f64;
        let h = natural.height as f64;
        NormalizedRect {
            x: self.left as f64 / w,
            y: self.top as f64 / h,
            width: self.width as f64 / w,
            height: self.height as f64 / h,
        }
    }
}

/// Crop box as fractions of the natural dimensions, for rendering at any size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Natural rect together with the fractions derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub natural: NaturalRect,
    pub normalized: NormalizedRect,
}

/// Which part of the box an interaction grabbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Handle {
    Move,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Size of the image once fitted into the stage at a uniform scale.
pub fn fit_display(natural: Dimensions, stage_width: f64, stage_height: f64) -> (f64, f64) {
    let nw = natural.width as f64;
    let nh = natural.height as f64;
    // Pin the limiting axis to the stage exactly so it carries no rounding error.
    if stage_width / nw <= stage_height / nh {
        (stage_width, nh * stage_width / nw)
    } else {
        (nw * stage_height / nh, stage_height)
    }
}

/// Largest centered box of `target_ratio` inside the fitted display area.
pub fn init_box(
    natural: Dimensions,
    stage_width: f64,
    stage_height: f64,
    target_ratio: f64,
) -> StageBox {
    let (display_width, display_height) = fit_display(natural, stage_width, stage_height);

    let (width, height) = if display_width / display_height >= target_ratio {
        (display_height * target_ratio, display_height)
    } else {
        (display_width, display_width / target_ratio)
    };

    StageBox {
        left: (display_width - width) / 2.0,
        top: (display_height - height) / 2.0,
        width,
        height,
    }
}

fn bound(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() {
        lo
    } else {
        value.max(lo).min(hi)
    }
}

/// Clamp a box into `display_width x display_height` with a minimum edge.
///
/// Size is settled before position, so a second pass finds nothing to change.
pub fn clamp_box(b: StageBox, display_width: f64, display_height: f64, min_size: f64) -> StageBox {
    let min_w = min_size.min(display_width);
    let min_h = min_size.min(display_height);

    let width = bound(b.width, min_w, display_width);
    let height = bound(b.height, min_h, display_height);

    StageBox {
        left: bound(b.left, 0.0, display_width - width),
        top: bound(b.top, 0.0, display_height - height),
        width,
        height,
    }
}

/// Geometry state for one preset of one banner.
#[derive(Debug, Clone, PartialEq)]
pub struct CropGeometry {
    natural: Dimensions,
    stage_width: f64,
    stage_height: f64,
    display_width: f64,
    display_height: f64,
    min_size: f64,
    current: StageBox,
}

impl CropGeometry {
    /// Start a session on the default box for `target_ratio`.
    pub fn new(
        natural: Dimensions,
        stage_width: f64,
        stage_height: f64,
        target_ratio: f64,
        min_size: f64,
    ) -> Result<Self, GeometryError> {
        if natural.width == 0 || natural.height == 0 {
            return Err(GeometryError::ZeroDimensions(natural.width, natural.height));
        }
        if !(stage_width > 0.0 && stage_height > 0.0) {
            return Err(GeometryError::InvalidStage(stage_width, stage_height));
        }
        if !(target_ratio > 0.0) || !target_ratio.is_finite() {
            return Err(GeometryError::InvalidRatio(target_ratio));
        }

        let (display_width, display_height) = fit_display(natural, stage_width, stage_height);
        let initial = init_box(natural, stage_width, stage_height, target_ratio);

        let mut geometry = Self {
            natural,
            stage_width,
            stage_height,
            display_width,
            display_height,
            min_size,
            current: initial,
        };
        geometry.current = geometry.clamp(initial);
        Ok(geometry)
    }

    pub fn natural(&self) -> Dimensions {
        self.natural
    }

    pub fn stage(&self) -> (f64, f64) {
        (self.stage_width, self.stage_height)
    }

    pub fn display(&self) -> (f64, f64) {
        (self.display_width, self.display_height)
    }

    pub fn current(&self) -> StageBox {
        self.current
    }

    pub fn set_box(&mut self, b: StageBox) {
        self.current = self.clamp(b);
    }

    pub fn clamp(&self, b: StageBox) -> StageBox {
        clamp_box(b, self.display_width, self.display_height, self.min_size)
    }

    pub fn move_or_resize(&mut self, handle: Handle, dx: f64, dy: f64) {
        let b = self.current;
        let min_w = self.min_size.min(self.display_width);
        let min_h = self.min_size.min(self.display_height);

        let (mut x0, mut y0) = (b.left, b.top);
        let (mut x1, mut y1) = (b.left + b.width, b.top + b.height);

        // The dragged corner moves; the opposite corner stays anchored.
        match handle {
            Handle::Move => {
                self.current = self.clamp(StageBox {
                    left: b.left + dx,
                    top: b.top + dy,
                    ..b
                });
                return;
            }
            Handle::TopLeft => {
                x0 = bound(x0 + dx, 0.0, x1 - min_w);
                y0 = bound(y0 + dy, 0.0, y1 - min_h);
            }
            Handle::TopRight => {
                x1 = bound(x1 + dx, x0 + min_w, self.display_width);
                y0 = bound(y0 + dy, 0.0, y1 - min_h);
            }
            Handle::BottomLeft => {
                x0 = bound(x0 + dx, 0.0, x1 - min_w);
                y1 = bound(y1 + dy, y0 + min_h, self.display_height);
            }
            Handle::BottomRight => {
                x1 = bound(x1 + dx, x0 + min_w, self.display_width);
                y1 = bound(y1 + dy, y0 + min_h, self.display_height);
            }
        }

        self.current = self.clamp(StageBox {
            left: x0,
            top: y0,
            width: x1 - x0,
            height: y1 - y0,
        });
    }

    pub fn current_ratio(&self) -> f64 {
        self.current.ratio()
    }

    pub fn ratio_deviation(&self, target_ratio: f64) -> f64 {
        crate::validation::ratio_deviation(self.current_ratio(), target_ratio)
    }

    /// Natural pixels per display pixel. Same on both axes.
    pub fn scale(&self) -> f64 {
        self.natural.width as f64 / self.display_width
    }

    pub fn to_natural_rect(&self) -> CropRect {
        self.box_to_natural(self.current)
    }

    pub fn box_to_natural(&self, b: StageBox) -> CropRect {
        let scale = self.scale();
        let nw = self.natural.width;
        let nh = self.natural.height;

        let left = ((b.left * scale).round().max(0.0) as u32).min(nw);
        let top = ((b.top * scale).round().max(0.0) as u32).min(nh);
        let width = ((b.width * scale).round().max(0.0) as u32).min(nw - left);
        let height = ((b.height * scale).round().max(0.0) as u32).min(nh - top);

        let natural = NaturalRect { left, top, width, height };
        CropRect {
            natural,
            normalized: natural.normalized(self.natural),
        }
    }

    pub fn from_natural_rect(&self, rect: &NaturalRect) -> StageBox {
        let scale = self.scale();
        StageBox {
            left: rect.left as f64 / scale,
            top: rect.top as f64 / scale,
            width: rect.width as f64 / scale,
            height: rect.height as f64 / scale,
        }
    }

    /// Seed the session from a persisted rect.
    pub fn load_natural(&mut self, rect: &NaturalRect) {
        self.current = self.clamp(self.from_natural_rect(rect));
    }
}
