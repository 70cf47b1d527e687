use crate::core::validation::SentinelSet;
use crate::types::{Band, BandImage, TemperatureUnit, KELVIN_OFFSET};
use serde::{Deserialize, Serialize};

/// Unit detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitParams {
    /// Bands whose median exceeds this are treated as Kelvin
    pub kelvin_threshold: f64,
    /// Upper bound on samples inspected when estimating the median
    pub median_sample_limit: usize,
}

impl Default for UnitParams {
    fn default() -> Self {
        Self {
            kelvin_threshold: 100.0,
            median_sample_limit: 1_000_000,
        }
    }
}

/// Detects Kelvin bands and converts them to Celsius
pub struct UnitNormalizer {
    params: UnitParams,
}

impl UnitNormalizer {
    pub fn new(params: UnitParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(UnitParams::default())
    }

    /// Median of the non-sentinel samples, estimated on a strided subset
    pub fn representative_median(&self, data: &BandImage, sentinels: &SentinelSet) -> Option<f64> {
        let total = data.len();
        if total == 0 {
            return None;
        }
        let stride = (total / self.params.median_sample_limit.max(1)).max(1);

        let mut sample: Vec<f64> = data
            .iter()
            .step_by(stride)
            .map(|&v| v as f64)
            .filter(|&v| !sentinels.matches(v))
            .collect();

        if sample.is_empty() {
            return None;
        }

        let len = sample.len();
        let mid = len / 2;
        let (lower, upper_mid, _) = sample.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        let upper_mid = *upper_mid;
        if len % 2 == 0 {
            let lower_mid = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            Some((lower_mid + upper_mid) / 2.0)
        } else {
            Some(upper_mid)
        }
    }

    /// Decide the unit of a band once, for all of its pixels
    pub fn detect_unit(&self, data: &BandImage, sentinels: &SentinelSet) -> TemperatureUnit {
        match self.representative_median(data, sentinels) {
            Some(median) if median > self.params.kelvin_threshold => TemperatureUnit::ConvertedFromKelvin,
            _ => TemperatureUnit::Celsius,
        }
    }

    /// Convert a band to Celsius in place; sentinels are left untouched
    pub fn normalize(&self, band: &mut Band, sentinels: &SentinelSet) -> TemperatureUnit {
        if band.unit != TemperatureUnit::Unknown {
            return band.unit;
        }

        let unit = self.detect_unit(&band.data, sentinels);
        if unit == TemperatureUnit::ConvertedFromKelvin {
            log::info!("Band {} looks like Kelvin, converting to Celsius", band.index);
            convert_kelvin(&mut band.data, sentinels);
        } else {
            log::debug!("Band {} already in Celsius", band.index);
        }

        band.unit = unit;
        unit
    }
}

fn convert_kelvin(data: &mut BandImage, sentinels: &SentinelSet) {
    let offset = KELVIN_OFFSET as f32;
    #[cfg(feature = "parallel")]
    {
        data.par_mapv_inplace(|v| if sentinels.matches(v as f64) { v } else { v - offset });
    }
    #[cfg(not(feature = "parallel"))]
    {
        data.mapv_inplace(|v| if sentinels.matches(v as f64) { v } else { v - offset });
    }
}

/// Raw value of a normalized sample, undoing the Kelvin conversion
pub fn denormalize(value: f64, unit: TemperatureUnit, sentinels: &SentinelSet) -> f64 {
    match unit {
        TemperatureUnit::ConvertedFromKelvin if !sentinels.matches(value) => value + KELVIN_OFFSET,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::ValidationThresholds;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn sentinels() -> SentinelSet {
        ValidationThresholds::default().sentinels(None)
    }

    #[test]
    fn test_kelvin_band_converted() {
        let mut band = Band::new(1, Array2::from_elem((10, 10), 300.0));
        band.data[[0, 0]] = -9999.0;

        let unit = UnitNormalizer::standard().normalize(&mut band, &sentinels());
        assert_eq!(unit, TemperatureUnit::ConvertedFromKelvin);
        assert_relative_eq!(band.data[[5, 5]] as f64, 26.85, epsilon = 1e-4);
        // Sentinel survives conversion
        assert_eq!(band.data[[0, 0]], -9999.0);
    }

    #[test]
    fn test_celsius_band_unchanged() {
        let mut band = Band::new(1, Array2::from_elem((10, 10), 25.0));
        let unit = UnitNormalizer::standard().normalize(&mut band, &sentinels());
        assert_eq!(unit, TemperatureUnit::Celsius);
        assert!(band.data.iter().all(|&v| v == 25.0));
    }

    #[test]
    fn test_median_ignores_sentinels() {
        // Mostly sentinels; the few real samples decide the unit
        let mut data = Array2::from_elem((10, 10), -9999.0f32);
        for col in 0..5 {
            data[[0, col]] = 290.0 + col as f32;
        }
        let normalizer = UnitNormalizer::standard();
        let median = normalizer.representative_median(&data, &sentinels()).unwrap();
        assert_relative_eq!(median, 292.0);
        assert_eq!(normalizer.detect_unit(&data, &sentinels()), TemperatureUnit::ConvertedFromKelvin);
    }

    #[test]
    fn test_even_sample_median_averages_middle() {
        let data = Array2::from_shape_vec((1, 4), vec![10.0, 40.0, 20.0, 30.0]).unwrap();
        let median = UnitNormalizer::standard()
            .representative_median(&data, &sentinels())
            .unwrap();
        assert_relative_eq!(median, 25.0);
    }

    #[test]
    fn test_denormalize_restores_kelvin() {
        let s = sentinels();
        assert_relative_eq!(denormalize(26.85, TemperatureUnit::ConvertedFromKelvin, &s), 300.0, epsilon = 1e-9);
        assert_eq!(denormalize(-9999.0, TemperatureUnit::ConvertedFromKelvin, &s), -9999.0);
        assert_eq!(denormalize(12.0, TemperatureUnit::Celsius, &s), 12.0);
    }
}
