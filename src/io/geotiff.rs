use crate::core::validation::SentinelSet;
use crate::io::source::{block_average, block_bounds, BandScaling, RasterDimensions, RasterSource};
use crate::types::{BandImage, GeoTransform, ThermalError, ThermalResult};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// GeoTIFF (or any GDAL-readable raster) opened for thermal analysis
pub struct GeoTiffSource {
    dataset: Dataset,
    path: PathBuf,
}

impl GeoTiffSource {
    pub fn open<P: AsRef<Path>>(path: P) -> ThermalResult<Self> {
        log::info!("Opening raster: {}", path.as_ref().display());
        let dataset = Dataset::open(path.as_ref())?;
        Ok(Self {
            dataset,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rasterband(&self, band: usize) -> ThermalResult<gdal::raster::RasterBand<'_>> {
        Ok(self.dataset.rasterband(band as isize)?)
    }

    /// Read `rows` full-width native rows starting at `start_row`
    fn read_rows(
        &self,
        rb: &gdal::raster::RasterBand<'_>,
        start_row: usize,
        rows: usize,
    ) -> ThermalResult<BandImage> {
        let (width, _) = self.dataset.raster_size();
        let buffer = rb.read_as::<f32>((0, start_row as isize), (width, rows), (width, rows), None)?;
        Array2::from_shape_vec((rows, width), buffer.data).map_err(|e| {
            ThermalError::UnderlyingReadFailure(format!(
                "Failed to reshape rows {}..{} of {}: {}",
                start_row,
                start_row + rows,
                self.path.display(),
                e
            ))
        })
    }
}

impl RasterSource for GeoTiffSource {
    fn dimensions(&self) -> ThermalResult<RasterDimensions> {
        let (width, height) = self.dataset.raster_size();
        let band_count = self.dataset.raster_count();
        log::debug!("{}: {}x{} pixels, {} bands", self.path.display(), width, height, band_count);
        Ok(RasterDimensions {
            width: width as i64,
            height: height as i64,
            band_count: band_count as i64,
        })
    }

    fn geo_transform(&self) -> ThermalResult<GeoTransform> {
        match self.dataset.geo_transform() {
            Ok(gt) => Ok(GeoTransform::from_gdal(gt)),
            Err(e) => {
                log::warn!("{} has no geotransform ({}), using pixel coordinates", self.path.display(), e);
                Ok(GeoTransform::identity())
            }
        }
    }

    fn no_data_value(&self, band: usize) -> ThermalResult<Option<f64>> {
        Ok(self.rasterband(band)?.no_data_value())
    }

    fn band_scaling(&self, band: usize) -> ThermalResult<BandScaling> {
        let rb = self.rasterband(band)?;
        Ok(BandScaling {
            scale: rb.scale().unwrap_or(1.0),
            offset: rb.offset().unwrap_or(0.0),
        })
    }

    fn read_band(
        &self,
        band: usize,
        out_shape: (usize, usize),
        sentinels: &SentinelSet,
    ) -> ThermalResult<BandImage> {
        let (width, height) = self.dataset.raster_size();
        let (out_rows, out_cols) = out_shape;
        let rb = self.rasterband(band)?;

        if (out_rows, out_cols) == (height, width) {
            return self.read_rows(&rb, 0, height);
        }

        // GDAL's average resampling only skips the declared no-data value, so
        // reduce one strip of native rows at a time instead
        log::debug!("Reading band {} at {}x{} (block average)", band, out_cols, out_rows);
        let mut output = Array2::<f32>::from_elem(out_shape, f32::NAN);
        for out_row in 0..out_rows {
            let (start_row, end_row) = block_bounds(out_row, height, out_rows);
            let strip = self.read_rows(&rb, start_row, end_row - start_row)?;
            let reduced = block_average(&strip, (1, out_cols), sentinels)?;
            output.row_mut(out_row).assign(&reduced.row(0));
        }
        Ok(output)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
