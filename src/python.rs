use crate::config::ThermalConfig;
use crate::core::downsample::DownsampleRequest;
use crate::core::pipeline::{NoProgress, PreparedRaster, ThermalSession};
use crate::io::{MemoryRaster, RasterSource};
use crate::types::{GeoTransform, SampleResult, SamplingMode, ThermalError};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

type GdalTransform = (f64, f64, f64, f64, f64, f64);

fn to_py_err(err: ThermalError) -> PyErr {
    match err {
        ThermalError::InvalidConfig(_)
        | ThermalError::InvalidDimensions { .. }
        | ThermalError::PixelOutOfBounds { .. }
        | ThermalError::ShapeMismatch { .. }
        | ThermalError::BandNotFound { .. } => PyValueError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.user_message()),
    }
}

fn parse_mode(mode: &str) -> PyResult<SamplingMode> {
    match mode.to_lowercase().as_str() {
        "pixel" => Ok(SamplingMode::Pixel),
        "cell" => Ok(SamplingMode::Cell),
        "neighborhood" => Ok(SamplingMode::Neighborhood),
        _ => Err(PyValueError::new_err(format!("Invalid sampling mode: {}", mode))),
    }
}

fn summary_to_dict(py: Python, prepared: &PreparedRaster) -> PyResult<PyObject> {
    let report = prepared.report();
    let grid = prepared.grid();

    let result = PyDict::new(py);
    result.set_item("source", prepared.source_name())?;
    result.set_item("width", prepared.stack().width())?;
    result.set_item("height", prepared.stack().height())?;
    result.set_item("band_count", prepared.stack().band_count())?;
    result.set_item("selected_band", report.band_index)?;
    result.set_item("band_score", report.quality_score)?;
    result.set_item("unit", report.unit.to_string())?;
    result.set_item("scale_factor", prepared.plan().scale_factor)?;
    result.set_item("valid_percentage", report.valid_percentage)?;
    result.set_item("quality", format!("{:?}", report.quality_level))?;
    result.set_item("min", report.min)?;
    result.set_item("max", report.max)?;
    result.set_item("mean", report.mean)?;
    result.set_item("cell_size", grid.cell_size)?;
    result.set_item("grid_cols", grid.grid_cols)?;
    result.set_item("grid_rows", grid.grid_rows)?;
    result.set_item("prepared_at", prepared.prepared_at().to_rfc3339())?;
    Ok(result.into())
}

fn sample_to_dict(py: Python, sample: &SampleResult) -> PyResult<PyObject> {
    let result = PyDict::new(py);
    result.set_item("row", sample.row)?;
    result.set_item("col", sample.col)?;
    result.set_item("latitude", sample.latitude)?;
    result.set_item("longitude", sample.longitude)?;
    result.set_item("raw_value", sample.raw_value)?;
    result.set_item("temperature_celsius", sample.temperature_celsius)?;
    result.set_item("temperature_kelvin", sample.temperature_kelvin)?;
    result.set_item("validity", sample.validity.to_string())?;
    result.set_item("was_interpolated", sample.was_interpolated)?;

    if let Some(stats) = &sample.neighborhood {
        let neighborhood = PyDict::new(py);
        neighborhood.set_item("cells_used", stats.cells_used)?;
        neighborhood.set_item("pixel_count", stats.pixel_count)?;
        neighborhood.set_item("min", stats.min)?;
        neighborhood.set_item("max", stats.max)?;
        neighborhood.set_item("std_dev", stats.std_dev)?;
        result.set_item("neighborhood", neighborhood)?;
    }
    if let Some((neighbors, radius)) = sample.interpolation {
        result.set_item("interpolation_neighbors", neighbors)?;
        result.set_item("interpolation_radius", radius)?;
    }
    Ok(result.into())
}

/// Python wrapper for ThermalSession
#[pyclass(name = "ThermalSession")]
struct PyThermalSession {
    inner: ThermalSession,
    allow_downsample: bool,
}

impl PyThermalSession {
    fn load_source<S: RasterSource + ?Sized>(&mut self, py: Python, source: &S) -> PyResult<PyObject> {
        let allow = self.allow_downsample;
        let confirm = |request: &DownsampleRequest| {
            log::info!(
                "Downsample {}x{} by {} ({} MB at full resolution): {}",
                request.original_width,
                request.original_height,
                request.scale_factor,
                request.estimated_bytes / (1024 * 1024),
                if allow { "accepted" } else { "declined" }
            );
            allow
        };
        let prepared = self.inner.load(source, &confirm, &NoProgress).map_err(to_py_err)?;
        summary_to_dict(py, prepared)
    }
}

#[pymethods]
impl PyThermalSession {
    #[new]
    #[pyo3(signature = (config_path=None, allow_downsample=true))]
    fn new(config_path: Option<String>, allow_downsample: bool) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => ThermalConfig::from_json_file(&path).map_err(to_py_err)?,
            None => ThermalConfig::default(),
        };
        Ok(PyThermalSession {
            inner: ThermalSession::new(config),
            allow_downsample,
        })
    }

    /// Load bands given as 2D float32 arrays
    #[pyo3(signature = (bands, geo_transform=None, no_data=None))]
    fn load_arrays(
        &mut self,
        py: Python,
        bands: Vec<PyReadonlyArray2<f32>>,
        geo_transform: Option<GdalTransform>,
        no_data: Option<f64>,
    ) -> PyResult<PyObject> {
        let arrays = bands.iter().map(|b| b.as_array().to_owned()).collect();
        let gt = match geo_transform {
            Some((a, b, c, d, e, f)) => GeoTransform::from_gdal([a, b, c, d, e, f]),
            None => GeoTransform::identity(),
        };
        let source = MemoryRaster::new(arrays, gt)
            .with_name("numpy")
            .with_no_data(no_data);
        self.load_source(py, &source)
    }

    /// Load a GeoTIFF from disk
    fn open_geotiff(&mut self, py: Python, path: String) -> PyResult<PyObject> {
        #[cfg(feature = "gdal")]
        {
            let source = crate::io::GeoTiffSource::open(&path).map_err(to_py_err)?;
            self.load_source(py, &source)
        }
        #[cfg(not(feature = "gdal"))]
        {
            let _ = py;
            Err(PyRuntimeError::new_err(format!(
                "geotemp was built without GDAL support, cannot open {}",
                path
            )))
        }
    }

    /// Use another band of the loaded raster as the thermal band
    fn select_band(&mut self, py: Python, band: usize) -> PyResult<PyObject> {
        let prepared = self.inner.select_band(band, &NoProgress).map_err(to_py_err)?;
        summary_to_dict(py, prepared)
    }

    #[pyo3(signature = (row, col, mode=None))]
    fn sample(&self, py: Python, row: usize, col: usize, mode: Option<String>) -> PyResult<PyObject> {
        let prepared = self
            .inner
            .current()
            .ok_or_else(|| to_py_err(ThermalError::NoRasterLoaded))?;
        let sample = match mode {
            Some(mode) => prepared.sample_with_mode(parse_mode(&mode)?, row, col),
            None => prepared.sample(row, col),
        }
        .map_err(to_py_err)?;
        sample_to_dict(py, &sample)
    }

    fn sample_geo(&self, py: Python, lat: f64, lon: f64) -> PyResult<PyObject> {
        let prepared = self
            .inner
            .current()
            .ok_or_else(|| to_py_err(ThermalError::NoRasterLoaded))?;
        let sample = prepared.sample_geo(lat, lon).map_err(to_py_err)?;
        sample_to_dict(py, &sample)
    }

    /// Selected band in Celsius
    fn thermal_band(&self, py: Python) -> PyResult<PyObject> {
        let prepared = self
            .inner
            .current()
            .ok_or_else(|| to_py_err(ThermalError::NoRasterLoaded))?;
        let band = prepared.thermal_band().map_err(to_py_err)?;
        Ok(band.data.to_pyarray(py).into())
    }

    fn summary(&self, py: Python) -> PyResult<PyObject> {
        let prepared = self
            .inner
            .current()
            .ok_or_else(|| to_py_err(ThermalError::NoRasterLoaded))?;
        summary_to_dict(py, prepared)
    }

    fn is_loaded(&self) -> bool {
        self.inner.is_loaded()
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyThermalSession>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
