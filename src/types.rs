use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Single sample of a thermal band
pub type TempSample = f32;

/// 2D band array (rows x cols)
pub type BandImage = Array2<TempSample>;

/// Offset between the Kelvin and Celsius scales
pub const KELVIN_OFFSET: f64 = 273.15;

/// Unit a band's samples are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    /// Not yet inspected by the unit normalizer
    Unknown,
    /// Values were already Celsius
    Celsius,
    /// Values were Kelvin and have been converted to Celsius
    ConvertedFromKelvin,
}

impl std::fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemperatureUnit::Unknown => write!(f, "unknown"),
            TemperatureUnit::Celsius => write!(f, "Celsius"),
            TemperatureUnit::ConvertedFromKelvin => write!(f, "Kelvin (converted)"),
        }
    }
}

/// Per-pixel plausibility class of a temperature sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidityClass {
    Normal,
    Unusual,
    Impossible,
    NoData,
}

impl ValidityClass {
    /// Normal and Unusual samples may be reported and averaged
    pub fn is_accepted(self) -> bool {
        matches!(self, ValidityClass::Normal | ValidityClass::Unusual)
    }

    /// Impossible and NoData samples are rejected everywhere downstream
    pub fn is_rejected(self) -> bool {
        !self.is_accepted()
    }
}

impl std::fmt::Display for ValidityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidityClass::Normal => write!(f, "normal"),
            ValidityClass::Unusual => write!(f, "unusual"),
            ValidityClass::Impossible => write!(f, "impossible"),
            ValidityClass::NoData => write!(f, "no data"),
        }
    }
}

/// Per-pixel validity classes of the selected band
pub type ValidityMask = Array2<ValidityClass>;

/// Affine pixel -> geocoordinate transform (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build from the six GDAL coefficients
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Identity transform: geocoordinates equal pixel coordinates
    pub fn identity() -> Self {
        Self::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    /// Geocoordinate `(lat, lon)` of the center of pixel `(row, col)`
    pub fn pixel_to_geo(&self, row: usize, col: usize) -> (f64, f64) {
        let x = col as f64 + 0.5;
        let y = row as f64 + 0.5;
        let lon = self.top_left_x + x * self.pixel_width + y * self.rotation_x;
        let lat = self.top_left_y + x * self.rotation_y + y * self.pixel_height;
        (lat, lon)
    }

    /// Pixel `(row, col)` containing geocoordinate `(lat, lon)`; `None` if it
    /// falls before the first row/column or the transform is degenerate
    pub fn geo_to_pixel(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dlon = lon - self.top_left_x;
        let dlat = lat - self.top_left_y;
        let x = (dlon * self.pixel_height - self.rotation_x * dlat) / det;
        let y = (self.pixel_width * dlat - self.rotation_y * dlon) / det;
        if x < 0.0 || y < 0.0 || !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some((y.floor() as usize, x.floor() as usize))
    }

    /// Transform for a grid whose pixels span `x_scale` native columns and
    /// `y_scale` native rows
    pub fn resampled(&self, x_scale: f64, y_scale: f64) -> Self {
        Self {
            top_left_x: self.top_left_x,
            pixel_width: self.pixel_width * x_scale,
            rotation_x: self.rotation_x * y_scale,
            top_left_y: self.top_left_y,
            rotation_y: self.rotation_y * x_scale,
            pixel_height: self.pixel_height * y_scale,
        }
    }
}

/// One 2D layer of a multi-band raster
#[derive(Debug, Clone)]
pub struct Band {
    /// 1-based band number as the raster source numbers it
    pub index: usize,
    pub data: BandImage,
    pub was_downsampled: bool,
    pub scale_factor: usize,
    /// No-data sentinel declared by the file for this band
    pub no_data: Option<f64>,
    pub unit: TemperatureUnit,
}

impl Band {
    pub fn new(index: usize, data: BandImage) -> Self {
        Self {
            index,
            data,
            was_downsampled: false,
            scale_factor: 1,
            no_data: None,
            unit: TemperatureUnit::Unknown,
        }
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn with_scale_factor(mut self, scale_factor: usize) -> Self {
        self.scale_factor = scale_factor.max(1);
        self.was_downsampled = self.scale_factor > 1;
        self
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Ordered bands of one loaded raster plus its georeferencing
#[derive(Debug, Clone)]
pub struct RasterStack {
    bands: Vec<Band>,
    width: usize,
    height: usize,
    pub geo_transform: GeoTransform,
}

impl RasterStack {
    /// Assemble a stack; every band must share the same shape
    pub fn new(bands: Vec<Band>, geo_transform: GeoTransform) -> ThermalResult<Self> {
        let (height, width) = match bands.first() {
            Some(band) => band.dim(),
            None => {
                return Err(ThermalError::InvalidDimensions {
                    width: 0,
                    height: 0,
                    band_count: 0,
                })
            }
        };

        if width == 0 || height == 0 {
            return Err(ThermalError::InvalidDimensions {
                width: width as i64,
                height: height as i64,
                band_count: bands.len() as i64,
            });
        }

        for band in &bands {
            if band.dim() != (height, width) {
                return Err(ThermalError::ShapeMismatch {
                    band: band.index,
                    expected: (height, width),
                    found: band.dim(),
                });
            }
        }

        Ok(Self {
            bands,
            width,
            height,
            geo_transform,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Band by 1-based index
    pub fn band(&self, index: usize) -> Option<&Band> {
        self.bands.iter().find(|b| b.index == index)
    }

    pub(crate) fn band_mut(&mut self, index: usize) -> Option<&mut Band> {
        self.bands.iter_mut().find(|b| b.index == index)
    }

    pub fn contains_pixel(&self, row: usize, col: usize) -> bool {
        row < self.height && col < self.width
    }
}

/// Adaptive grid laid over the loaded raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub cell_size: usize,
    pub grid_cols: usize,
    pub grid_rows: usize,
}

/// How a point query aggregates pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplingMode {
    /// The clicked pixel only
    Pixel,
    /// Mean of the clicked grid cell
    Cell,
    /// Mean of the clicked cell and its 8 neighbors
    #[default]
    Neighborhood,
}

/// Statistics over the pixels that fed a grid-averaged sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodStats {
    pub cells_used: usize,
    pub pixel_count: usize,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

/// Outcome of one point query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    pub row: usize,
    pub col: usize,
    pub latitude: f64,
    pub longitude: f64,
    /// Clicked pixel in source units: scale/offset metadata applied, Kelvin
    /// conversion undone
    pub raw_value: f64,
    pub raw_validity: ValidityClass,
    pub temperature_celsius: f64,
    pub temperature_kelvin: f64,
    pub validity: ValidityClass,
    pub was_interpolated: bool,
    pub mode: SamplingMode,
    pub neighborhood: Option<NeighborhoodStats>,
    /// (neighbors used, search radius in pixels) when interpolated
    pub interpolation: Option<(usize, usize)>,
}

/// Error types for thermal raster processing
#[derive(Debug, thiserror::Error)]
pub enum ThermalError {
    #[error("Invalid raster dimensions: {width}x{height} with {band_count} bands")]
    InvalidDimensions {
        width: i64,
        height: i64,
        band_count: i64,
    },

    #[error("No band contains usable temperature data")]
    NoUsableBand,

    #[error("No valid neighbors within {max_radius}px of pixel ({row}, {col})")]
    NoValidNeighbors {
        row: usize,
        col: usize,
        max_radius: usize,
    },

    #[error("Load cancelled")]
    LoadCancelled,

    #[error("Raster read failed: {0}")]
    UnderlyingReadFailure(String),

    #[error("Pixel ({row}, {col}) is outside the {width}x{height} raster")]
    PixelOutOfBounds {
        row: usize,
        col: usize,
        width: usize,
        height: usize,
    },

    #[error("Band {band} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        band: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No raster is loaded")]
    NoRasterLoaded,

    #[error("Band {band} does not exist ({band_count} bands)")]
    BandNotFound { band: usize, band_count: usize },
}

impl ThermalError {
    /// Outcomes users hit routinely; report them plainly, not as failures
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ThermalError::LoadCancelled | ThermalError::NoValidNeighbors { .. }
        )
    }

    /// Short text suitable for a status line
    pub fn user_message(&self) -> String {
        match self {
            ThermalError::NoValidNeighbors { .. } => "No data available at this location".to_string(),
            ThermalError::LoadCancelled => "File loading cancelled".to_string(),
            ThermalError::NoUsableBand => "No band in this file contains temperature data".to_string(),
            ThermalError::PixelOutOfBounds { .. } => "Location is outside the image".to_string(),
            ThermalError::NoRasterLoaded => "Open a raster first".to_string(),
            ThermalError::BandNotFound { band, band_count } => {
                format!("Band {} is not available (1-{})", band, band_count)
            }
            other => format!("Failed to load raster: {}", other),
        }
    }
}

impl From<std::io::Error> for ThermalError {
    fn from(err: std::io::Error) -> Self {
        ThermalError::UnderlyingReadFailure(err.to_string())
    }
}

impl From<serde_json::Error> for ThermalError {
    fn from(err: serde_json::Error) -> Self {
        ThermalError::InvalidConfig(err.to_string())
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for ThermalError {
    fn from(err: gdal::errors::GdalError) -> Self {
        ThermalError::UnderlyingReadFailure(err.to_string())
    }
}

/// Result type for thermal raster operations
pub type ThermalResult<T> = Result<T, ThermalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_uses_pixel_center() {
        let gt = GeoTransform::from_gdal([10.0, 0.5, 0.0, 50.0, 0.0, -0.5]);
        let (lat, lon) = gt.pixel_to_geo(0, 0);
        assert_relative_eq!(lon, 10.25);
        assert_relative_eq!(lat, 49.75);

        let (lat, lon) = gt.resampled(2.0, 2.0).pixel_to_geo(1, 1);
        assert_relative_eq!(lon, 11.5);
        assert_relative_eq!(lat, 48.5);
    }

    #[test]
    fn test_resampled_uses_per_axis_ratio() {
        // 41 native columns read as 20: each output pixel spans 2.05 columns
        let gt = GeoTransform::from_gdal([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        let coarse = gt.resampled(41.0 / 20.0, 2.0);

        let (_, right_edge) = coarse.pixel_to_geo(0, 19);
        assert_relative_eq!(right_edge + 0.5 * 2.05, 41.0, epsilon = 1e-9);
        let (bottom, _) = coarse.pixel_to_geo(9, 0);
        assert_relative_eq!(bottom, -19.0);
    }

    #[test]
    fn test_geo_to_pixel_inverts_transform() {
        let gt = GeoTransform::from_gdal([10.0, 0.5, 0.0, 50.0, 0.0, -0.5]);
        let (lat, lon) = gt.pixel_to_geo(7, 3);
        assert_eq!(gt.geo_to_pixel(lat, lon), Some((7, 3)));
        // West of the raster
        assert_eq!(gt.geo_to_pixel(49.0, 9.0), None);
    }

    #[test]
    fn test_stack_rejects_mismatched_bands() {
        let a = Band::new(1, Array2::zeros((4, 4)));
        let b = Band::new(2, Array2::zeros((4, 5)));
        let err = RasterStack::new(vec![a, b], GeoTransform::identity()).unwrap_err();
        assert!(matches!(err, ThermalError::ShapeMismatch { band: 2, .. }));
    }

    #[test]
    fn test_expected_errors() {
        assert!(ThermalError::LoadCancelled.is_expected());
        let err = ThermalError::NoValidNeighbors { row: 1, col: 2, max_radius: 40 };
        assert!(err.is_expected());
        assert_eq!(err.user_message(), "No data available at this location");
        assert!(!ThermalError::NoUsableBand.is_expected());
    }
}
