use crate::core::band_scoring::ScoringParams;
use crate::core::downsample::DownsampleParams;
use crate::core::grid_sampler::SamplerParams;
use crate::core::interpolation::{InterpolationParams, RadiusExpansion};
use crate::core::units::UnitParams;
use crate::core::validation::ValidationThresholds;
use crate::types::{ThermalError, ThermalResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete set of tunables for loading and sampling a thermal raster
///
/// Every section falls back to its defaults when missing from a JSON file,
/// so `{}` is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    pub downsample: DownsampleParams,
    pub scoring: ScoringParams,
    pub units: UnitParams,
    pub validation: ValidationThresholds,
    pub interpolation: InterpolationParams,
    pub sampler: SamplerParams,
}

impl ThermalConfig {
    pub fn from_json_str(json: &str) -> ThermalResult<Self> {
        let config: ThermalConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ThermalResult<Self> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ThermalError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> ThermalResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject parameter combinations the pipeline cannot work with
    pub fn validate(&self) -> ThermalResult<()> {
        let invalid = |msg: String| Err(ThermalError::InvalidConfig(msg));

        if self.downsample.max_pixels == 0 {
            return invalid("downsample.max_pixels must be positive".into());
        }

        let s = &self.scoring;
        if s.normal_weight < 0.0 || s.valid_weight < 0.0 || s.normal_weight + s.valid_weight <= 0.0 {
            return invalid(format!(
                "scoring weights must be non-negative and not both zero (normal {}, valid {})",
                s.normal_weight, s.valid_weight
            ));
        }

        if self.units.median_sample_limit == 0 {
            return invalid("units.median_sample_limit must be positive".into());
        }

        let v = &self.validation;
        if v.normal_range.0 > v.normal_range.1 || v.unusual_range.0 > v.unusual_range.1 {
            return invalid("validation ranges must be ordered (low, high)".into());
        }
        if v.unusual_range.0 > v.normal_range.0 || v.unusual_range.1 < v.normal_range.1 {
            return invalid(format!(
                "unusual range {:?} must contain normal range {:?}",
                v.unusual_range, v.normal_range
            ));
        }
        if v.impossible_below > v.unusual_range.0 || v.impossible_above < v.unusual_range.1 {
            return invalid("impossible limits must lie outside the unusual range".into());
        }
        if v.sentinel_tolerance < 0.0 {
            return invalid("validation.sentinel_tolerance must be non-negative".into());
        }

        let i = &self.interpolation;
        if i.min_radius == 0 {
            return invalid("interpolation.min_radius must be positive".into());
        }
        if !(i.max_radius_fraction > 0.0 && i.max_radius_fraction <= 1.0) {
            return invalid(format!(
                "interpolation.max_radius_fraction must be in (0, 1], got {}",
                i.max_radius_fraction
            ));
        }
        if i.expansion == RadiusExpansion::FixedStep(0) {
            return invalid("interpolation fixed step must be positive".into());
        }
        if i.min_neighbors == 0 {
            return invalid("interpolation.min_neighbors must be at least 1".into());
        }

        if self.sampler.cell_size_override == Some(0) {
            return invalid("sampler.cell_size_override must be positive".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SamplingMode;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ThermalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.downsample.max_pixels, 50_000_000);
        assert_eq!(config.sampler.mode, SamplingMode::Neighborhood);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ThermalConfig::from_json_str(
            r#"{ "downsample": { "max_pixels": 1000 }, "sampler": { "mode": "Pixel" } }"#,
        )
        .unwrap();
        assert_eq!(config.downsample.max_pixels, 1000);
        assert_eq!(config.sampler.mode, SamplingMode::Pixel);
        assert_eq!(config.interpolation.min_radius, 50);
        assert_eq!(config.validation.normal_range, (0.0, 50.0));
    }

    #[test]
    fn test_rejects_inverted_ranges() {
        let mut config = ThermalConfig::default();
        config.validation.normal_range = (50.0, 0.0);
        assert!(matches!(config.validate(), Err(ThermalError::InvalidConfig(_))));

        let mut config = ThermalConfig::default();
        config.scoring.normal_weight = -1.0;
        assert!(config.validate().is_err());

        let mut config = ThermalConfig::default();
        config.interpolation.expansion = RadiusExpansion::FixedStep(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "interpolation": {{ "min_radius": 10 }} }}"#).unwrap();

        let config = ThermalConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.interpolation.min_radius, 10);

        let round_trip = ThermalConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(round_trip.interpolation.min_radius, 10);

        assert!(ThermalConfig::from_json_file("/nonexistent/thermal.json").is_err());
        assert!(ThermalConfig::from_json_str("{ not json").is_err());
    }
}
