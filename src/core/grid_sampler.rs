use crate::config::ThermalConfig;
use crate::core::interpolation::{InterpolationParams, NoDataInterpolator};
use crate::core::units::denormalize;
use crate::core::validation::{TemperatureValidator, ValidationReport, ValidationThresholds};
use crate::types::{
    Band, GridSpec, NeighborhoodStats, RasterStack, SampleResult, SamplingMode, ThermalError,
    ThermalResult, ValidityClass, ValidityMask, KELVIN_OFFSET,
};
use ndarray::s;
use serde::{Deserialize, Serialize};

/// Point sampling parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    pub mode: SamplingMode,
    /// Fixed cell size instead of the resolution-based lookup
    pub cell_size_override: Option<usize>,
}

/// Cell size for an image whose larger side is `max_dim` pixels
pub fn cell_size_for(max_dim: usize) -> usize {
    match max_dim {
        0..=999 => 20,
        1000..=5000 => 40,
        5001..=10000 => 80,
        _ => 150,
    }
}

/// Grid layout for a `width` x `height` image
pub fn compute_grid_spec(width: usize, height: usize, cell_size_override: Option<usize>) -> GridSpec {
    let cell_size = cell_size_override
        .filter(|&c| c > 0)
        .unwrap_or_else(|| cell_size_for(width.max(height)));
    GridSpec {
        cell_size,
        grid_cols: (width + cell_size - 1) / cell_size,
        grid_rows: (height + cell_size - 1) / cell_size,
    }
}

/// Running statistics over accepted pixels
#[derive(Debug, Clone, Copy)]
struct PixelAccumulator {
    count: usize,
    sum: f64,
    sum_sq: f64,
    min: f64,
    max: f64,
}

impl PixelAccumulator {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_sq += value * value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn merge(&mut self, other: &PixelAccumulator) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn std_dev(&self) -> f64 {
        match self.mean() {
            Some(mean) => (self.sum_sq / self.count as f64 - mean * mean).max(0.0).sqrt(),
            None => 0.0,
        }
    }
}

/// Averages temperatures over the adaptive grid around a clicked pixel
#[derive(Debug, Clone)]
pub struct GridSampler {
    params: SamplerParams,
    validator: TemperatureValidator,
    interpolator: NoDataInterpolator,
}

impl GridSampler {
    pub fn new(
        params: SamplerParams,
        thresholds: ValidationThresholds,
        interpolation: InterpolationParams,
    ) -> Self {
        Self {
            params,
            validator: TemperatureValidator::new(thresholds),
            interpolator: NoDataInterpolator::new(interpolation),
        }
    }

    pub fn standard() -> Self {
        Self::new(
            SamplerParams::default(),
            ValidationThresholds::default(),
            InterpolationParams::default(),
        )
    }

    /// Sampler using the thresholds and search limits of `config`
    pub fn from_config(config: &ThermalConfig) -> Self {
        Self::new(
            config.sampler.clone(),
            config.validation.clone(),
            config.interpolation.clone(),
        )
    }

    pub fn with_mode(mut self, mode: SamplingMode) -> Self {
        self.params.mode = mode;
        self
    }

    pub fn mode(&self) -> SamplingMode {
        self.params.mode
    }

    pub fn grid_spec(&self, width: usize, height: usize) -> GridSpec {
        compute_grid_spec(width, height, self.params.cell_size_override)
    }

    /// Mean of the accepted pixels of grid cell `(grid_row, grid_col)`
    pub fn cell_mean(
        &self,
        band: &Band,
        mask: &ValidityMask,
        grid: &GridSpec,
        grid_row: usize,
        grid_col: usize,
    ) -> Option<f64> {
        self.cell_accumulator(band, mask, grid, grid_row, grid_col).mean()
    }

    fn cell_accumulator(
        &self,
        band: &Band,
        mask: &ValidityMask,
        grid: &GridSpec,
        grid_row: usize,
        grid_col: usize,
    ) -> PixelAccumulator {
        let (height, width) = band.dim();
        let row_start = grid_row * grid.cell_size;
        let col_start = grid_col * grid.cell_size;
        let row_end = (row_start + grid.cell_size).min(height);
        let col_end = (col_start + grid.cell_size).min(width);

        let mut acc = PixelAccumulator::new();
        if row_start >= row_end || col_start >= col_end {
            return acc;
        }

        let values = band.data.slice(s![row_start..row_end, col_start..col_end]);
        let classes = mask.slice(s![row_start..row_end, col_start..col_end]);
        for (&v, class) in values.iter().zip(classes.iter()) {
            if class.is_accepted() {
                acc.push(v as f64);
            }
        }
        acc
    }

    /// Clicked cell first, then its in-bounds neighbors
    fn cells_for(&self, grid: &GridSpec, grid_row: usize, grid_col: usize) -> Vec<(usize, usize)> {
        let mut cells = vec![(grid_row, grid_col)];
        if self.params.mode != SamplingMode::Neighborhood {
            return cells;
        }
        for dr in -1i64..=1 {
            for dc in -1i64..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                let r = grid_row as i64 + dr;
                let c = grid_col as i64 + dc;
                if r >= 0 && c >= 0 && (r as usize) < grid.grid_rows && (c as usize) < grid.grid_cols {
                    cells.push((r as usize, c as usize));
                }
            }
        }
        cells
    }

    /// Sample the temperature at `(row, col)` of the validated band
    pub fn sample(
        &self,
        stack: &RasterStack,
        report: &ValidationReport,
        row: usize,
        col: usize,
    ) -> ThermalResult<SampleResult> {
        let band = stack.band(report.band_index).ok_or(ThermalError::NoUsableBand)?;
        if report.mask.dim() != band.dim() {
            return Err(ThermalError::ShapeMismatch {
                band: band.index,
                expected: report.mask.dim(),
                found: band.dim(),
            });
        }
        if !stack.contains_pixel(row, col) {
            return Err(ThermalError::PixelOutOfBounds {
                row,
                col,
                width: stack.width(),
                height: stack.height(),
            });
        }

        let mask = &report.mask;
        let pixel = band.data[[row, col]] as f64;
        let raw_validity = mask[[row, col]];
        let (latitude, longitude) = stack.geo_transform.pixel_to_geo(row, col);

        let mut result = SampleResult {
            row,
            col,
            latitude,
            longitude,
            raw_value: denormalize(pixel, band.unit, &report.sentinels),
            raw_validity,
            temperature_celsius: f64::NAN,
            temperature_kelvin: f64::NAN,
            validity: raw_validity,
            was_interpolated: false,
            mode: self.params.mode,
            neighborhood: None,
            interpolation: None,
        };

        let direct = match self.params.mode {
            SamplingMode::Pixel => raw_validity.is_accepted().then_some(pixel),
            SamplingMode::Cell | SamplingMode::Neighborhood => {
                let grid = self.grid_spec(stack.width(), stack.height());
                self.average_cells(band, mask, &grid, row, col, &mut result)
            }
        };

        let celsius = match direct {
            Some(value) => value,
            None => {
                let interpolated = self.interpolator.interpolate(&band.data, mask, row, col)?;
                result.was_interpolated = true;
                result.interpolation = Some((interpolated.neighbors, interpolated.radius));
                interpolated.value
            }
        };

        result.temperature_celsius = celsius;
        result.temperature_kelvin = celsius + KELVIN_OFFSET;
        result.validity = self.validator.classify(celsius, &report.sentinels);

        if result.validity == ValidityClass::Unusual {
            log::warn!(
                "Unusual temperature {:.1} C at ({}, {}): {:?}",
                celsius,
                row,
                col,
                self.validator.unusual_kind(celsius, &report.sentinels)
            );
        }
        log::debug!(
            "Sampled ({}, {}) -> {:.2} C ({}, interpolated: {})",
            row, col, celsius, result.validity, result.was_interpolated
        );

        Ok(result)
    }

    /// Mean of per-cell means; cells without accepted pixels are skipped
    fn average_cells(
        &self,
        band: &Band,
        mask: &ValidityMask,
        grid: &GridSpec,
        row: usize,
        col: usize,
        result: &mut SampleResult,
    ) -> Option<f64> {
        let grid_row = row / grid.cell_size;
        let grid_col = col / grid.cell_size;

        let mut cell_means = Vec::with_capacity(9);
        let mut pooled = PixelAccumulator::new();
        for (r, c) in self.cells_for(grid, grid_row, grid_col) {
            let acc = self.cell_accumulator(band, mask, grid, r, c);
            if let Some(mean) = acc.mean() {
                cell_means.push(mean);
                pooled.merge(&acc);
            }
        }

        if cell_means.is_empty() {
            return None;
        }

        result.neighborhood = Some(NeighborhoodStats {
            cells_used: cell_means.len(),
            pixel_count: pooled.count,
            min: pooled.min,
            max: pooled.max,
            std_dev: pooled.std_dev(),
        });

        Some(cell_means.iter().sum::<f64>() / cell_means.len() as f64)
    }
}

/// Sample with the default sampler configuration
///
/// The result's validity is classified against the default thresholds and
/// interpolation uses the default search radii. Use
/// [`GridSampler::from_config`] when `report` came from a custom
/// [`ThermalConfig`].
pub fn sample(
    stack: &RasterStack,
    report: &ValidationReport,
    row: usize,
    col: usize,
) -> ThermalResult<SampleResult> {
    GridSampler::standard().sample(stack, report, row, col)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn prepared(data: Array2<f32>) -> (RasterStack, ValidationReport) {
        let mut band = Band::new(1, data);
        band.unit = crate::types::TemperatureUnit::Celsius;
        let report = TemperatureValidator::default().validate(&band, 1.0);
        let stack = RasterStack::new(vec![band], GeoTransform::identity()).unwrap();
        (stack, report)
    }

    #[test]
    fn test_cell_size_lookup() {
        assert_eq!(cell_size_for(999), 20);
        assert_eq!(cell_size_for(1000), 40);
        assert_eq!(cell_size_for(5000), 40);
        assert_eq!(cell_size_for(5001), 80);
        assert_eq!(cell_size_for(10000), 80);
        assert_eq!(cell_size_for(10001), 150);

        let grid = compute_grid_spec(5000, 3000, None);
        assert_eq!(grid, GridSpec { cell_size: 40, grid_cols: 125, grid_rows: 75 });
        let grid = compute_grid_spec(105, 50, None);
        assert_eq!((grid.grid_cols, grid.grid_rows), (6, 3));
    }

    #[test]
    fn test_corner_click_uses_existing_neighbors_only() {
        // 100x100 -> 20px cells, 5x5 grid
        let mut data = Array2::from_elem((100, 100), -9999.0f32);
        data.slice_mut(s![0..20, 0..20]).fill(10.0);
        data.slice_mut(s![0..20, 20..40]).fill(20.0);
        data.slice_mut(s![20..40, 20..40]).fill(30.0);
        // Outside the 3x3 neighborhood of cell (0, 0)
        data.slice_mut(s![0..20, 40..60]).fill(45.0);
        let (stack, report) = prepared(data);

        let result = sample(&stack, &report, 5, 5).unwrap();
        assert_relative_eq!(result.temperature_celsius, 20.0, epsilon = 1e-9);
        assert!(!result.was_interpolated);
        let stats = result.neighborhood.unwrap();
        assert_eq!(stats.cells_used, 3);
        assert_eq!(stats.pixel_count, 1200);
        assert_eq!((stats.min, stats.max), (10.0, 30.0));
    }

    #[test]
    fn test_unusual_pixels_count_in_cell_means() {
        let mut data = Array2::from_elem((40, 40), 20.0f32);
        data.slice_mut(s![0..20, 0..20]).fill(-40.0);
        let (stack, report) = prepared(data);

        let result = GridSampler::standard()
            .with_mode(SamplingMode::Cell)
            .sample(&stack, &report, 0, 0)
            .unwrap();
        assert_relative_eq!(result.temperature_celsius, -40.0);
        assert_eq!(result.validity, ValidityClass::Unusual);
        assert_eq!(result.raw_validity, ValidityClass::Unusual);
    }

    #[test]
    fn test_empty_neighborhood_falls_back_to_interpolation() {
        // 500x500 -> 20px cells; max radius 100
        let mut data = Array2::from_elem((500, 500), -9999.0f32);
        data[[250, 330]] = 12.0;
        let (stack, report) = prepared(data);

        let result = sample(&stack, &report, 250, 250).unwrap();
        assert!(result.was_interpolated);
        assert_eq!(result.temperature_celsius, 12.0);
        assert_eq!(result.interpolation, Some((1, 100)));
        assert_eq!(result.validity, ValidityClass::Normal);
        assert_eq!(result.raw_validity, ValidityClass::NoData);
        assert_eq!(result.raw_value, -9999.0);
        assert!(result.neighborhood.is_none());
    }

    #[test]
    fn test_no_data_anywhere_reports_no_valid_neighbors() {
        let data = Array2::from_elem((60, 60), f32::NAN);
        let (stack, report) = prepared(data);
        let err = sample(&stack, &report, 30, 30).unwrap_err();
        assert!(err.is_expected());
        assert!(matches!(err, ThermalError::NoValidNeighbors { max_radius: 12, .. }));
    }

    #[test]
    fn test_pixel_mode_returns_exact_value() {
        let mut data = Array2::from_elem((30, 30), 15.0f32);
        data[[7, 9]] = 33.25;
        data[[8, 9]] = -9999.0;
        let (stack, report) = prepared(data);
        let sampler = GridSampler::standard().with_mode(SamplingMode::Pixel);

        let exact = sampler.sample(&stack, &report, 7, 9).unwrap();
        assert_eq!(exact.temperature_celsius, 33.25);
        assert!(!exact.was_interpolated);
        assert_relative_eq!(exact.temperature_kelvin, 306.4, epsilon = 1e-9);

        let filled = sampler.sample(&stack, &report, 8, 9).unwrap();
        assert!(filled.was_interpolated);
        assert_eq!(filled.raw_validity, ValidityClass::NoData);
    }

    #[test]
    fn test_out_of_bounds_click() {
        let (stack, report) = prepared(Array2::from_elem((10, 10), 20.0f32));
        let err = sample(&stack, &report, 10, 0).unwrap_err();
        assert!(matches!(err, ThermalError::PixelOutOfBounds { .. }));
    }

    #[test]
    fn test_from_config_classifies_with_custom_thresholds() {
        let mut config = ThermalConfig::default();
        config.validation.normal_range = (0.0, 10.0);
        config.sampler.mode = SamplingMode::Pixel;

        let mut band = Band::new(1, Array2::from_elem((30, 30), 20.0f32));
        band.unit = crate::types::TemperatureUnit::Celsius;
        let report = TemperatureValidator::new(config.validation.clone()).validate(&band, 1.0);
        assert_eq!(report.unusual_count, 900);
        let stack = RasterStack::new(vec![band], GeoTransform::identity()).unwrap();

        let result = GridSampler::from_config(&config).sample(&stack, &report, 3, 3).unwrap();
        assert_eq!(result.validity, ValidityClass::Unusual);
        assert_eq!(result.mode, SamplingMode::Pixel);

        // The free function classifies against the defaults
        let default_result = sample(&stack, &report, 3, 3).unwrap();
        assert_eq!(default_result.validity, ValidityClass::Normal);
    }
}
