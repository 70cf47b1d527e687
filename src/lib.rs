//! geotemp: Thermal Raster Analysis for Geospatial Imagery
//!
//! Loads multi-band thermal rasters (GeoTIFF via GDAL, or in-memory arrays),
//! picks the band that actually holds temperatures, normalizes Kelvin to
//! Celsius, flags implausible pixels and answers point queries with
//! grid-averaged or interpolated temperatures.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types
pub use types::{
    Band, BandImage, GeoTransform, GridSpec, RasterStack, SampleResult, SamplingMode,
    TemperatureUnit, ThermalError, ThermalResult, ValidityClass,
};
pub use config::ThermalConfig;
pub use io::{MemoryRaster, RasterSource};
#[cfg(feature = "gdal")]
pub use io::GeoTiffSource;
pub use crate::core::{
    load_and_prepare, sample, AutoConfirm, LoadConfirmation, LoadStage, NoProgress,
    PreparedRaster, ProgressSink, ThermalSession,
};
