//! Raster input: the source trait, an in-memory raster and the GDAL reader

pub mod source;
#[cfg(feature = "gdal")]
pub mod geotiff;

pub use source::{BandScaling, MemoryRaster, RasterDimensions, RasterSource};
#[cfg(feature = "gdal")]
pub use geotiff::GeoTiffSource;
