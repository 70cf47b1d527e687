use crate::core::units::{UnitNormalizer, UnitParams};
use crate::core::validation::ValidationThresholds;
use crate::types::{Band, TemperatureUnit, ThermalError, ThermalResult, KELVIN_OFFSET};
use serde::{Deserialize, Serialize};

/// Weights of the band "temperature-likeness" score
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Weight of the share of pixels in the normal range
    pub normal_weight: f64,
    /// Weight of the share of non-sentinel pixels
    pub valid_weight: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            normal_weight: 0.7,
            valid_weight: 0.3,
        }
    }
}

/// Score of one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandScore {
    pub band_index: usize,
    pub valid_fraction: f64,
    pub normal_fraction: f64,
    pub score: f64,
    pub unit: TemperatureUnit,
}

/// Selected band plus every band's score for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandSelection {
    pub selected_index: usize,
    pub score: f64,
    pub scores: Vec<BandScore>,
}

/// Picks the band that looks most like surface temperature
pub struct BandQualityScorer {
    params: ScoringParams,
    normalizer: UnitNormalizer,
    thresholds: ValidationThresholds,
}

impl BandQualityScorer {
    pub fn new(params: ScoringParams, unit_params: UnitParams, thresholds: ValidationThresholds) -> Self {
        Self {
            params,
            normalizer: UnitNormalizer::new(unit_params),
            thresholds,
        }
    }

    pub fn standard() -> Self {
        Self::new(
            ScoringParams::default(),
            UnitParams::default(),
            ValidationThresholds::default(),
        )
    }

    /// Score a single band with its unit tentatively normalized
    pub fn score_band(&self, band: &Band) -> BandScore {
        let sentinels = self.thresholds.sentinels(band.no_data);
        let unit = match band.unit {
            TemperatureUnit::Unknown => self.normalizer.detect_unit(&band.data, &sentinels),
            known => known,
        };
        // Already-converted bands need no further offset
        let offset = if unit == TemperatureUnit::ConvertedFromKelvin && band.unit == TemperatureUnit::Unknown {
            KELVIN_OFFSET
        } else {
            0.0
        };

        let total = band.data.len();
        let mut valid = 0usize;
        let mut normal = 0usize;
        for &raw in band.data.iter() {
            let raw = raw as f64;
            if sentinels.matches(raw) {
                continue;
            }
            valid += 1;
            if self.thresholds.in_normal_range(raw - offset) {
                normal += 1;
            }
        }

        let (valid_fraction, normal_fraction) = if total > 0 {
            (valid as f64 / total as f64, normal as f64 / total as f64)
        } else {
            (0.0, 0.0)
        };
        let score = self.params.normal_weight * normal_fraction + self.params.valid_weight * valid_fraction;

        log::debug!(
            "Band {}: {:.1}% normal, {:.1}% valid, unit {}, score {:.3}",
            band.index,
            normal_fraction * 100.0,
            valid_fraction * 100.0,
            unit,
            score
        );

        BandScore {
            band_index: band.index,
            valid_fraction,
            normal_fraction,
            score,
            unit,
        }
    }

    /// Score every band and select the best; ties go to the lowest index
    pub fn select_best(&self, bands: &[Band]) -> ThermalResult<BandSelection> {
        log::info!("Analyzing {} bands for temperature data", bands.len());

        let scores = self.score_all(bands);

        let mut best: Option<&BandScore> = None;
        for candidate in scores.iter().filter(|s| s.valid_fraction > 0.0) {
            best = match best {
                Some(current)
                    if candidate.score > current.score
                        || (candidate.score == current.score && candidate.band_index < current.band_index) =>
                {
                    Some(candidate)
                }
                Some(current) => Some(current),
                None => Some(candidate),
            };
        }

        let (selected_index, score) = best
            .map(|b| (b.band_index, b.score))
            .ok_or(ThermalError::NoUsableBand)?;
        log::info!("Selected band {} (score {:.3})", selected_index, score);

        Ok(BandSelection {
            selected_index,
            score,
            scores,
        })
    }

    #[cfg(feature = "parallel")]
    fn score_all(&self, bands: &[Band]) -> Vec<BandScore> {
        use rayon::prelude::*;
        bands.par_iter().map(|band| self.score_band(band)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn score_all(&self, bands: &[Band]) -> Vec<BandScore> {
        bands.iter().map(|band| self.score_band(band)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn band_from(index: usize, values: Vec<f32>) -> Band {
        Band::new(index, Array2::from_shape_vec((2, 2), values).unwrap())
    }

    #[test]
    fn test_score_components() {
        // 2 normal, 1 unusual, 1 sentinel
        let band = band_from(1, vec![10.0, 20.0, -30.0, -9999.0]);
        let score = BandQualityScorer::standard().score_band(&band);
        assert_relative_eq!(score.valid_fraction, 0.75);
        assert_relative_eq!(score.normal_fraction, 0.5);
        assert_relative_eq!(score.score, 0.7 * 0.5 + 0.3 * 0.75);
        assert_eq!(score.unit, TemperatureUnit::Celsius);
    }

    #[test]
    fn test_kelvin_band_scored_after_conversion() {
        let band = band_from(1, vec![290.0, 295.0, 300.0, 305.0]);
        let score = BandQualityScorer::standard().score_band(&band);
        assert_eq!(score.unit, TemperatureUnit::ConvertedFromKelvin);
        assert_relative_eq!(score.normal_fraction, 1.0);
        assert_relative_eq!(score.score, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_selects_most_temperature_like_band() {
        let counts = band_from(1, vec![5000.0, 6000.0, 7000.0, 8000.0]);
        let thermal = band_from(2, vec![21.0, 22.0, 23.0, 24.0]);
        let patchy = band_from(3, vec![21.0, f32::NAN, 23.0, 24.0]);
        let selection = BandQualityScorer::standard()
            .select_best(&[counts, thermal, patchy])
            .unwrap();
        assert_eq!(selection.selected_index, 2);
        assert_relative_eq!(selection.score, 1.0, epsilon = 1e-12);
        assert_eq!(selection.scores.len(), 3);
        assert_relative_eq!(selection.scores[0].normal_fraction, 0.0);
        assert_relative_eq!(selection.scores[2].score, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        let a = band_from(4, vec![20.0; 4]);
        let b = band_from(2, vec![20.0; 4]);
        let scorer = BandQualityScorer::standard();
        let first = scorer.select_best(&[a.clone(), b.clone()]).unwrap();
        let second = scorer.select_best(&[a, b]).unwrap();
        assert_eq!(first.selected_index, 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_all_sentinel_bands_fail() {
        let a = band_from(1, vec![-9999.0; 4]);
        let b = band_from(2, vec![f32::NAN; 4]);
        let err = BandQualityScorer::standard().select_best(&[a, b]).unwrap_err();
        assert!(matches!(err, ThermalError::NoUsableBand));
    }
}
