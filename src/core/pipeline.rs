/*!
 * Load pipeline: open -> plan resolution -> read bands -> pick the thermal
 * band -> normalize units -> validate -> lay out the sampling grid.
 *
 * The result is an immutable [`PreparedRaster`] that answers point queries.
 * [`PreparedRaster::with_band`] re-runs the last three steps on another band
 * of the same stack, without reading the source again.
 * [`ThermalSession`] holds at most one prepared raster and only replaces it
 * once a new load (or band switch) has fully succeeded.
 */

use crate::config::ThermalConfig;
use crate::core::band_scoring::{BandQualityScorer, BandSelection};
use crate::core::downsample::{DownsamplePlan, DownsamplePlanner, DownsampleRequest};
use crate::core::grid_sampler::{compute_grid_spec, GridSampler};
use crate::core::units::UnitNormalizer;
use crate::core::validation::{TemperatureValidator, ValidationReport};
use crate::io::RasterSource;
use crate::types::{
    Band, GridSpec, RasterStack, SampleResult, SamplingMode, TemperatureUnit, ThermalError,
    ThermalResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Progress event emitted while a raster is being prepared
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LoadStage {
    Opened {
        width: usize,
        height: usize,
        band_count: usize,
    },
    Downsampling {
        scale_factor: usize,
    },
    AnalyzingBands {
        band_count: usize,
    },
    BandSelected {
        index: usize,
        score: f64,
        /// Chosen by the caller rather than by scoring
        manual: bool,
    },
    Validating {
        band: usize,
    },
    Ready {
        band: usize,
        unit: TemperatureUnit,
        valid_percentage: f64,
    },
}

/// Receiver of [`LoadStage`] events
pub trait ProgressSink {
    fn notify(&self, stage: LoadStage);
}

/// Discards progress events
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _stage: LoadStage) {}
}

impl<F: Fn(LoadStage)> ProgressSink for F {
    fn notify(&self, stage: LoadStage) {
        self(stage)
    }
}

/// Decides whether a reduced-resolution load may proceed
pub trait LoadConfirmation {
    fn confirm(&self, request: &DownsampleRequest) -> bool;
}

/// Accepts every downsampling request
pub struct AutoConfirm;

impl LoadConfirmation for AutoConfirm {
    fn confirm(&self, _request: &DownsampleRequest) -> bool {
        true
    }
}

impl<F: Fn(&DownsampleRequest) -> bool> LoadConfirmation for F {
    fn confirm(&self, request: &DownsampleRequest) -> bool {
        self(request)
    }
}

/// A loaded raster with its thermal band selected, normalized and validated
pub struct PreparedRaster {
    source_name: String,
    stack: RasterStack,
    report: ValidationReport,
    selection: BandSelection,
    grid: GridSpec,
    plan: DownsamplePlan,
    prepared_at: DateTime<Utc>,
    sampler: GridSampler,
}

impl PreparedRaster {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn stack(&self) -> &RasterStack {
        &self.stack
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn selection(&self) -> &BandSelection {
        &self.selection
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    pub fn plan(&self) -> &DownsamplePlan {
        &self.plan
    }

    pub fn prepared_at(&self) -> DateTime<Utc> {
        self.prepared_at
    }

    /// The selected band, in Celsius
    pub fn thermal_band(&self) -> ThermalResult<&Band> {
        self.stack
            .band(self.report.band_index)
            .ok_or(ThermalError::NoUsableBand)
    }

    pub fn sample(&self, row: usize, col: usize) -> ThermalResult<SampleResult> {
        self.sampler.sample(&self.stack, &self.report, row, col)
    }

    pub fn sample_with_mode(
        &self,
        mode: SamplingMode,
        row: usize,
        col: usize,
    ) -> ThermalResult<SampleResult> {
        if mode == self.sampler.mode() {
            return self.sample(row, col);
        }
        self.sampler
            .clone()
            .with_mode(mode)
            .sample(&self.stack, &self.report, row, col)
    }

    /// Same raster with `index` as the thermal band
    ///
    /// The band is unit-normalized and validated from the data already in
    /// memory. `self` is left untouched, so a failure keeps it usable.
    pub fn with_band(
        &self,
        index: usize,
        config: &ThermalConfig,
        progress: &dyn ProgressSink,
    ) -> ThermalResult<PreparedRaster> {
        config.validate()?;
        if self.stack.band(index).is_none() {
            return Err(ThermalError::BandNotFound {
                band: index,
                band_count: self.stack.band_count(),
            });
        }

        let score = self
            .selection
            .scores
            .iter()
            .find(|s| s.band_index == index)
            .map_or(0.0, |s| s.score);
        log::info!(
            "{}: switching thermal band {} -> {} (score {:.3})",
            self.source_name, self.report.band_index, index, score
        );

        let selection = BandSelection {
            selected_index: index,
            score,
            scores: self.selection.scores.clone(),
        };
        finish_preparation(
            self.source_name.clone(),
            self.stack.clone(),
            selection,
            self.plan.clone(),
            config,
            progress,
            true,
        )
    }

    /// Sample the pixel containing geocoordinate `(lat, lon)`
    pub fn sample_geo(&self, lat: f64, lon: f64) -> ThermalResult<SampleResult> {
        let out_of_bounds = ThermalError::PixelOutOfBounds {
            row: usize::MAX,
            col: usize::MAX,
            width: self.stack.width(),
            height: self.stack.height(),
        };
        let (row, col) = self
            .stack
            .geo_transform
            .geo_to_pixel(lat, lon)
            .ok_or(out_of_bounds)?;
        self.sample(row, col)
    }
}

impl std::fmt::Debug for PreparedRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedRaster")
            .field("source", &self.source_name)
            .field("width", &self.stack.width())
            .field("height", &self.stack.height())
            .field("band", &self.report.band_index)
            .field("grid", &self.grid)
            .field("prepared_at", &self.prepared_at)
            .finish()
    }
}

/// Run the full load pipeline against `source`
///
/// Nothing is read when `confirm` declines a downsampled load.
pub fn load_and_prepare<S: RasterSource + ?Sized>(
    source: &S,
    confirm: &dyn LoadConfirmation,
    progress: &dyn ProgressSink,
    config: &ThermalConfig,
) -> ThermalResult<PreparedRaster> {
    config.validate()?;
    let name = source.describe();

    let dims = source.dimensions()?;
    let plan = DownsamplePlanner::new(config.downsample.clone()).plan(
        dims.width,
        dims.height,
        dims.band_count,
    )?;
    log::info!(
        "Loading {}: {}x{} pixels, {} bands",
        name, plan.width, plan.height, plan.band_count
    );
    progress.notify(LoadStage::Opened {
        width: plan.width,
        height: plan.height,
        band_count: plan.band_count,
    });

    if let Some(request) = plan.confirmation_request() {
        if !confirm.confirm(&request) {
            log::info!("Load of {} cancelled at downsampling prompt", name);
            return Err(ThermalError::LoadCancelled);
        }
        log::info!(
            "Downsampling {} by {} to {}x{}",
            name, plan.scale_factor, plan.target_width, plan.target_height
        );
        progress.notify(LoadStage::Downsampling {
            scale_factor: plan.scale_factor,
        });
    }

    let (x_scale, y_scale) = plan.pixel_scale();
    let geo_transform = source.geo_transform()?.resampled(x_scale, y_scale);
    let out_shape = plan.out_shape();

    let mut bands = Vec::with_capacity(plan.band_count);
    for index in 1..=plan.band_count {
        let no_data = source.no_data_value(index)?;
        let sentinels = config.validation.sentinels(no_data);
        let scaling = source.band_scaling(index)?;
        let mut data = source.read_band(index, out_shape, &sentinels)?;
        if data.dim() != out_shape {
            return Err(ThermalError::ShapeMismatch {
                band: index,
                expected: out_shape,
                found: data.dim(),
            });
        }

        if !scaling.is_identity() {
            log::debug!(
                "Band {}: applying scale {} offset {}",
                index, scaling.scale, scaling.offset
            );
            data.mapv_inplace(|v| {
                if sentinels.matches(v as f64) {
                    v
                } else {
                    scaling.apply(v as f64) as f32
                }
            });
        }

        bands.push(
            Band::new(index, data)
                .with_no_data(no_data)
                .with_scale_factor(plan.scale_factor),
        );
    }

    let stack = RasterStack::new(bands, geo_transform)?;

    progress.notify(LoadStage::AnalyzingBands {
        band_count: stack.band_count(),
    });
    let scorer = BandQualityScorer::new(
        config.scoring.clone(),
        config.units.clone(),
        config.validation.clone(),
    );
    let selection = scorer.select_best(stack.bands())?;

    finish_preparation(name, stack, selection, plan, config, progress, false)
}

/// Normalize and validate the selected band, then lay out the grid
fn finish_preparation(
    name: String,
    mut stack: RasterStack,
    selection: BandSelection,
    plan: DownsamplePlan,
    config: &ThermalConfig,
    progress: &dyn ProgressSink,
    manual: bool,
) -> ThermalResult<PreparedRaster> {
    progress.notify(LoadStage::BandSelected {
        index: selection.selected_index,
        score: selection.score,
        manual,
    });

    let band = stack
        .band_mut(selection.selected_index)
        .ok_or(ThermalError::NoUsableBand)?;
    let sentinels = config.validation.sentinels(band.no_data);
    UnitNormalizer::new(config.units.clone()).normalize(band, &sentinels);

    progress.notify(LoadStage::Validating { band: band.index });
    let report = TemperatureValidator::new(config.validation.clone()).validate(band, selection.score);

    let grid = compute_grid_spec(stack.width(), stack.height(), config.sampler.cell_size_override);
    log::info!(
        "{} ready: band {} ({}), {:.1}% valid, {}px grid cells ({}x{})",
        name,
        report.band_index,
        report.unit,
        report.valid_percentage,
        grid.cell_size,
        grid.grid_cols,
        grid.grid_rows
    );
    progress.notify(LoadStage::Ready {
        band: report.band_index,
        unit: report.unit,
        valid_percentage: report.valid_percentage,
    });

    Ok(PreparedRaster {
        source_name: name,
        stack,
        report,
        selection,
        grid,
        plan,
        prepared_at: Utc::now(),
        sampler: GridSampler::from_config(config),
    })
}

/// Holds the currently loaded raster for an interactive caller
#[derive(Debug, Default)]
pub struct ThermalSession {
    config: ThermalConfig,
    current: Option<PreparedRaster>,
}

impl ThermalSession {
    pub fn new(config: ThermalConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    /// Load `source`; the previous raster stays current if this fails
    pub fn load<S: RasterSource + ?Sized>(
        &mut self,
        source: &S,
        confirm: &dyn LoadConfirmation,
        progress: &dyn ProgressSink,
    ) -> ThermalResult<&PreparedRaster> {
        match load_and_prepare(source, confirm, progress, &self.config) {
            Ok(prepared) => Ok(&*self.current.insert(prepared)),
            Err(e) => {
                if e.is_expected() {
                    log::info!("{}", e.user_message());
                } else {
                    log::error!("Failed to load {}: {}", source.describe(), e);
                }
                Err(e)
            }
        }
    }

    /// Make band `index` of the current raster the thermal band
    ///
    /// The current raster is kept unchanged if the switch fails.
    pub fn select_band(
        &mut self,
        index: usize,
        progress: &dyn ProgressSink,
    ) -> ThermalResult<&PreparedRaster> {
        let current = self.current.as_ref().ok_or(ThermalError::NoRasterLoaded)?;
        let switched = current.with_band(index, &self.config, progress).map_err(|e| {
            log::warn!("Cannot switch to band {}: {}", index, e);
            e
        })?;
        Ok(&*self.current.insert(switched))
    }

    pub fn current(&self) -> Option<&PreparedRaster> {
        self.current.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn sample(&self, row: usize, col: usize) -> ThermalResult<SampleResult> {
        self.current
            .as_ref()
            .ok_or(ThermalError::NoRasterLoaded)?
            .sample(row, col)
    }
}
