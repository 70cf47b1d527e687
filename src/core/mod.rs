//! Core thermal analysis modules

pub mod downsample;
pub mod units;
pub mod validation;
pub mod band_scoring;
pub mod interpolation;
pub mod grid_sampler;
pub mod pipeline;

// Re-export main types
pub use downsample::{DownsampleParams, DownsamplePlan, DownsamplePlanner, DownsampleRequest};
pub use units::{UnitNormalizer, UnitParams};
pub use validation::{QualityLevel, SentinelSet, TemperatureValidator, ValidationReport, ValidationThresholds};
pub use band_scoring::{BandQualityScorer, BandScore, BandSelection, ScoringParams};
pub use interpolation::{Interpolation, InterpolationParams, NoDataInterpolator, RadiusExpansion};
pub use grid_sampler::{compute_grid_spec, sample, GridSampler, SamplerParams};
pub use pipeline::{
    load_and_prepare, AutoConfirm, LoadConfirmation, LoadStage, NoProgress, PreparedRaster,
    ProgressSink, ThermalSession,
};
