/*!
 * Temperature plausibility validation
 *
 * Every sample of the selected band is classified, in this order:
 * - NoData: a declared sentinel (within tolerance), NaN or +/-Inf
 * - Impossible: outside the physical bounds
 * - Normal: inside the normal range
 * - Unusual: inside the unusual range but outside the normal range
 * - Impossible: anything else
 *
 * The mask and summary statistics are computed once per load and reused by
 * every point query.
 */

use crate::types::{Band, TemperatureUnit, ValidityClass, ValidityMask};
use ndarray::Zip;
use serde::{Deserialize, Serialize};

/// Named validation thresholds, in Celsius
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationThresholds {
    /// Sentinels in addition to NaN/Inf and the file's own no-data value
    pub no_data_sentinels: Vec<f64>,
    /// Absolute tolerance when matching sentinels
    pub sentinel_tolerance: f64,
    pub normal_range: (f64, f64),
    pub unusual_range: (f64, f64),
    pub impossible_below: f64,
    pub impossible_above: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            no_data_sentinels: vec![-9999.0, -127.0],
            sentinel_tolerance: 0.01,
            normal_range: (0.0, 50.0),
            unusual_range: (-60.0, 70.0),
            impossible_below: -100.0,
            impossible_above: 100.0,
        }
    }
}

impl ValidationThresholds {
    /// Sentinel matcher for a band with the given declared no-data value
    pub fn sentinels(&self, band_no_data: Option<f64>) -> SentinelSet {
        let mut values = self.no_data_sentinels.clone();
        if let Some(nd) = band_no_data.filter(|v| v.is_finite()) {
            if !values.iter().any(|&s| (s - nd).abs() <= self.sentinel_tolerance) {
                values.push(nd);
            }
        }
        SentinelSet {
            values,
            tolerance: self.sentinel_tolerance,
        }
    }

    pub fn in_normal_range(&self, celsius: f64) -> bool {
        celsius >= self.normal_range.0 && celsius <= self.normal_range.1
    }
}

/// No-data matcher; NaN and infinities always match
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelSet {
    values: Vec<f64>,
    tolerance: f64,
}

impl SentinelSet {
    pub fn matches(&self, value: f64) -> bool {
        if !value.is_finite() {
            return true;
        }
        self.values.iter().any(|&s| (value - s).abs() <= self.tolerance)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Direction of an unusual (accepted but suspicious) temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnusualKind {
    ExtremeCold,
    ExtremeHeat,
}

/// Data quality grade from the share of accepted pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl QualityLevel {
    pub fn from_valid_percentage(pct: f64) -> Self {
        if pct >= 95.0 {
            QualityLevel::Excellent
        } else if pct >= 80.0 {
            QualityLevel::Good
        } else if pct >= 60.0 {
            QualityLevel::Fair
        } else if pct >= 30.0 {
            QualityLevel::Poor
        } else {
            QualityLevel::VeryPoor
        }
    }
}

/// Validation summary of the selected band
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub band_index: usize,
    pub unit: TemperatureUnit,
    pub quality_score: f64,
    pub total_pixels: usize,
    pub normal_count: usize,
    pub unusual_count: usize,
    pub impossible_count: usize,
    pub no_data_count: usize,
    /// Over Normal and Unusual pixels; `None` when there are none
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_percentage: f64,
    pub quality_level: QualityLevel,
    pub sentinels: SentinelSet,
    pub mask: ValidityMask,
}

impl ValidationReport {
    pub fn accepted_count(&self) -> usize {
        self.normal_count + self.unusual_count
    }

    pub fn class_at(&self, row: usize, col: usize) -> Option<ValidityClass> {
        self.mask.get((row, col)).copied()
    }
}

/// Multi-level temperature validator
#[derive(Debug, Clone, Default)]
pub struct TemperatureValidator {
    thresholds: ValidationThresholds,
}

impl TemperatureValidator {
    pub fn new(thresholds: ValidationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ValidationThresholds {
        &self.thresholds
    }

    /// Classify one Celsius sample
    pub fn classify(&self, value: f64, sentinels: &SentinelSet) -> ValidityClass {
        let t = &self.thresholds;
        if sentinels.matches(value) {
            ValidityClass::NoData
        } else if value < t.impossible_below || value > t.impossible_above {
            ValidityClass::Impossible
        } else if t.in_normal_range(value) {
            ValidityClass::Normal
        } else if value >= t.unusual_range.0 && value <= t.unusual_range.1 {
            ValidityClass::Unusual
        } else {
            ValidityClass::Impossible
        }
    }

    /// Warning direction for an unusual sample, `None` otherwise
    pub fn unusual_kind(&self, value: f64, sentinels: &SentinelSet) -> Option<UnusualKind> {
        match self.classify(value, sentinels) {
            ValidityClass::Unusual if value < self.thresholds.normal_range.0 => Some(UnusualKind::ExtremeCold),
            ValidityClass::Unusual => Some(UnusualKind::ExtremeHeat),
            _ => None,
        }
    }

    /// Classify every pixel of a normalized band
    pub fn classify_band(&self, band: &Band, sentinels: &SentinelSet) -> ValidityMask {
        #[cfg(feature = "parallel")]
        {
            Zip::from(&band.data).par_map_collect(|&v| self.classify(v as f64, sentinels))
        }
        #[cfg(not(feature = "parallel"))]
        {
            band.data.mapv(|v| self.classify(v as f64, sentinels))
        }
    }

    /// Build the mask and summary for the selected band
    pub fn validate(&self, band: &Band, quality_score: f64) -> ValidationReport {
        let sentinels = self.thresholds.sentinels(band.no_data);
        let mask = self.classify_band(band, &sentinels);

        let (mut normal, mut unusual, mut impossible, mut no_data) = (0usize, 0usize, 0usize, 0usize);
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0f64;

        Zip::from(&band.data).and(&mask).for_each(|&v, &class| {
            match class {
                ValidityClass::Normal => normal += 1,
                ValidityClass::Unusual => unusual += 1,
                ValidityClass::Impossible => impossible += 1,
                ValidityClass::NoData => no_data += 1,
            }
            if class.is_accepted() {
                let v = v as f64;
                min = min.min(v);
                max = max.max(v);
                sum += v;
            }
        });

        let total_pixels = band.data.len();
        let accepted = normal + unusual;
        let valid_percentage = if total_pixels > 0 {
            accepted as f64 / total_pixels as f64 * 100.0
        } else {
            0.0
        };

        let report = ValidationReport {
            band_index: band.index,
            unit: band.unit,
            quality_score,
            total_pixels,
            normal_count: normal,
            unusual_count: unusual,
            impossible_count: impossible,
            no_data_count: no_data,
            min: (accepted > 0).then_some(min),
            max: (accepted > 0).then_some(max),
            mean: (accepted > 0).then(|| sum / accepted as f64),
            valid_percentage,
            quality_level: QualityLevel::from_valid_percentage(valid_percentage),
            sentinels,
            mask,
        };

        log::info!("Validation of band {} completed:", band.index);
        log::info!("  - Normal: {}, Unusual: {}, Impossible: {}, NoData: {}",
                   normal, unusual, impossible, no_data);
        log::info!("  - Valid pixels: {}/{} ({:.1}%, {:?})",
                   accepted, total_pixels, valid_percentage, report.quality_level);
        if let (Some(lo), Some(hi)) = (report.min, report.max) {
            log::debug!("  - Data range: {:.2} .. {:.2} C", lo, hi);
        }

        report
    }
}
