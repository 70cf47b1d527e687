use crate::core::validation::SentinelSet;
use crate::types::{BandImage, GeoTransform, ThermalError, ThermalResult};
use ndarray::Array2;

/// Declared raster size, known before any pixel is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterDimensions {
    pub width: i64,
    pub height: i64,
    pub band_count: i64,
}

/// Linear value transform stored in raster metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandScaling {
    pub scale: f64,
    pub offset: f64,
}

impl BandScaling {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.scale == 1.0 && self.offset == 0.0
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

impl Default for BandScaling {
    fn default() -> Self {
        Self::identity()
    }
}

/// Supplier of band arrays and georeferencing for one raster file
///
/// Bands are numbered from 1. `read_band` must honor `out_shape` (rows, cols)
/// without materializing the full-resolution band, and must leave samples
/// matched by `sentinels` out of any averaging.
pub trait RasterSource {
    fn dimensions(&self) -> ThermalResult<RasterDimensions>;

    fn geo_transform(&self) -> ThermalResult<GeoTransform>;

    fn no_data_value(&self, band: usize) -> ThermalResult<Option<f64>>;

    fn band_scaling(&self, _band: usize) -> ThermalResult<BandScaling> {
        Ok(BandScaling::identity())
    }

    fn read_band(
        &self,
        band: usize,
        out_shape: (usize, usize),
        sentinels: &SentinelSet,
    ) -> ThermalResult<BandImage>;

    /// Name for log messages
    fn describe(&self) -> String {
        "raster".to_string()
    }
}

/// Raster held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    name: String,
    bands: Vec<BandImage>,
    geo_transform: GeoTransform,
    no_data: Option<f64>,
    scaling: Vec<BandScaling>,
}

impl MemoryRaster {
    pub fn new(bands: Vec<BandImage>, geo_transform: GeoTransform) -> Self {
        let scaling = vec![BandScaling::identity(); bands.len()];
        Self {
            name: "memory".to_string(),
            bands,
            geo_transform,
            no_data: None,
            scaling,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    /// Scale/offset for a 1-based band
    pub fn with_scaling(mut self, band: usize, scaling: BandScaling) -> Self {
        if let Some(slot) = band.checked_sub(1).and_then(|i| self.scaling.get_mut(i)) {
            *slot = scaling;
        }
        self
    }

    fn band_array(&self, band: usize) -> ThermalResult<&BandImage> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or_else(|| ThermalError::UnderlyingReadFailure(format!(
                "band {} does not exist in {} ({} bands)",
                band, self.name, self.bands.len()
            )))
    }
}

impl RasterSource for MemoryRaster {
    fn dimensions(&self) -> ThermalResult<RasterDimensions> {
        let (height, width) = self.bands.first().map(|b| b.dim()).unwrap_or((0, 0));
        Ok(RasterDimensions {
            width: width as i64,
            height: height as i64,
            band_count: self.bands.len() as i64,
        })
    }

    fn geo_transform(&self) -> ThermalResult<GeoTransform> {
        Ok(self.geo_transform)
    }

    fn no_data_value(&self, band: usize) -> ThermalResult<Option<f64>> {
        self.band_array(band)?;
        Ok(self.no_data)
    }

    fn band_scaling(&self, band: usize) -> ThermalResult<BandScaling> {
        self.band_array(band)?;
        Ok(self.scaling[band - 1])
    }

    fn read_band(
        &self,
        band: usize,
        out_shape: (usize, usize),
        sentinels: &SentinelSet,
    ) -> ThermalResult<BandImage> {
        let data = self.band_array(band)?;
        if data.dim() == out_shape {
            return Ok(data.clone());
        }
        block_average(data, out_shape, sentinels)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Source index range `[start, end)` feeding output index `index` when `len`
/// samples are reduced to `out_len`
pub(crate) fn block_bounds(index: usize, len: usize, out_len: usize) -> (usize, usize) {
    let start = index * len / out_len;
    let end = ((index + 1) * len / out_len).max(start + 1);
    (start, end)
}

/// Average-resample `data` to `out_shape`, skipping sentinel samples
///
/// Blocks without a single usable sample become NaN.
pub fn block_average(
    data: &BandImage,
    out_shape: (usize, usize),
    sentinels: &SentinelSet,
) -> ThermalResult<BandImage> {
    let (rows, cols) = data.dim();
    let (out_rows, out_cols) = out_shape;

    if out_rows == 0 || out_cols == 0 || out_rows > rows || out_cols > cols {
        return Err(ThermalError::UnderlyingReadFailure(format!(
            "cannot resample {}x{} band to {}x{}",
            cols, rows, out_cols, out_rows
        )));
    }

    let mut output = Array2::<f32>::from_elem(out_shape, f32::NAN);
    for out_row in 0..out_rows {
        let (start_row, end_row) = block_bounds(out_row, rows, out_rows);
        for out_col in 0..out_cols {
            let (start_col, end_col) = block_bounds(out_col, cols, out_cols);

            let mut sum = 0.0f64;
            let mut count = 0usize;
            for in_row in start_row..end_row {
                for in_col in start_col..end_col {
                    let v = data[[in_row, in_col]];
                    if !sentinels.matches(v as f64) {
                        sum += v as f64;
                        count += 1;
                    }
                }
            }

            if count > 0 {
                output[[out_row, out_col]] = (sum / count as f64) as f32;
            }
        }
    }

    Ok(output)
}
