use crate::types::{ThermalError, ThermalResult};
use serde::{Deserialize, Serialize};

/// Pixel budget for a fully loaded raster (~200 MB per band at f32)
pub const DEFAULT_MAX_PIXELS: u64 = 50_000_000;

/// Downsampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownsampleParams {
    /// Largest width*height*bands loaded at native resolution
    pub max_pixels: u64,
}

impl Default for DownsampleParams {
    fn default() -> Self {
        Self {
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// What the caller is asked to confirm before a reduced-resolution load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownsampleRequest {
    pub original_width: usize,
    pub original_height: usize,
    pub band_count: usize,
    pub scale_factor: usize,
    pub target_width: usize,
    pub target_height: usize,
    /// Full-resolution size at 4 bytes per sample
    pub estimated_bytes: u64,
}

/// Resolution decision for one raster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownsamplePlan {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub total_pixels: u64,
    pub scale_factor: usize,
    pub target_width: usize,
    pub target_height: usize,
}

impl DownsamplePlan {
    pub fn is_downsampled(&self) -> bool {
        self.scale_factor > 1
    }

    /// Native (columns, rows) covered by one output pixel
    pub fn pixel_scale(&self) -> (f64, f64) {
        (
            self.width as f64 / self.target_width as f64,
            self.height as f64 / self.target_height as f64,
        )
    }

    /// Confirmation payload; `None` when the raster loads at native resolution
    pub fn confirmation_request(&self) -> Option<DownsampleRequest> {
        if !self.is_downsampled() {
            return None;
        }
        Some(DownsampleRequest {
            original_width: self.width,
            original_height: self.height,
            band_count: self.band_count,
            scale_factor: self.scale_factor,
            target_width: self.target_width,
            target_height: self.target_height,
            estimated_bytes: self
                .total_pixels
                .saturating_mul(std::mem::size_of::<f32>() as u64),
        })
    }

    /// Output shape handed to the raster source, as (rows, cols)
    pub fn out_shape(&self) -> (usize, usize) {
        (self.target_height, self.target_width)
    }
}

/// Decides whether a raster fits in memory at native resolution
pub struct DownsamplePlanner {
    params: DownsampleParams,
}

impl DownsamplePlanner {
    pub fn new(params: DownsampleParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(DownsampleParams::default())
    }

    /// Plan a load from the declared dimensions, before any pixel is read
    pub fn plan(&self, width: i64, height: i64, band_count: i64) -> ThermalResult<DownsamplePlan> {
        if width <= 0 || height <= 0 || band_count <= 0 {
            return Err(ThermalError::InvalidDimensions {
                width,
                height,
                band_count,
            });
        }

        let total_pixels = (width as u64)
            .checked_mul(height as u64)
            .and_then(|p| p.checked_mul(band_count as u64))
            .ok_or(ThermalError::InvalidDimensions {
                width,
                height,
                band_count,
            })?;
        let (width, height, band_count) = (width as usize, height as usize, band_count as usize);
        let max_pixels = self.params.max_pixels.max(1);

        let scale_factor = if total_pixels <= max_pixels {
            1
        } else {
            ((total_pixels as f64 / max_pixels as f64).sqrt().ceil() as usize).max(1)
        };

        let plan = DownsamplePlan {
            width,
            height,
            band_count,
            total_pixels,
            scale_factor,
            target_width: (width / scale_factor).max(1),
            target_height: (height / scale_factor).max(1),
        };

        if plan.is_downsampled() {
            log::info!(
                "Large raster: {}x{} x {} bands ({} pixels) -> downsample {}x to {}x{}",
                width, height, band_count, total_pixels, scale_factor,
                plan.target_width, plan.target_height
            );
        } else {
            log::debug!("Raster fits in budget: {} pixels <= {}", total_pixels, max_pixels);
        }

        Ok(plan)
    }
}
