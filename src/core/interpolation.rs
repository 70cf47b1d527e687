use crate::types::{BandImage, ThermalError, ThermalResult, ValidityClass, ValidityMask};
use serde::{Deserialize, Serialize};

/// How the search radius grows between passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RadiusExpansion {
    /// 50, 100, 200, ... up to the maximum
    Doubling,
    /// Grow by a fixed number of pixels per pass
    FixedStep(usize),
}

/// Inverse-distance-weighting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationParams {
    /// First search radius in pixels
    pub min_radius: usize,
    /// Maximum radius as a fraction of the larger image dimension
    pub max_radius_fraction: f64,
    pub expansion: RadiusExpansion,
    /// Normal neighbors required before a pass is accepted
    pub min_neighbors: usize,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            min_radius: 50,
            max_radius_fraction: 0.2,
            expansion: RadiusExpansion::Doubling,
            min_neighbors: 1,
        }
    }
}

/// Interpolated value and how it was obtained
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolation {
    pub value: f64,
    pub neighbors: usize,
    /// Radius of the accepted pass; 0 when the pixel itself was Normal
    pub radius: usize,
}

/// Fills rejected pixels from nearby Normal pixels
#[derive(Debug, Clone)]
pub struct NoDataInterpolator {
    params: InterpolationParams,
}

impl NoDataInterpolator {
    pub fn new(params: InterpolationParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(InterpolationParams::default())
    }

    pub fn max_radius(&self, width: usize, height: usize) -> usize {
        let larger = width.max(height) as f64;
        ((larger * self.params.max_radius_fraction).ceil() as usize).max(1)
    }

    /// Radii tried in order; the last one is always the maximum
    pub fn radius_schedule(&self, width: usize, height: usize) -> Vec<usize> {
        let max_radius = self.max_radius(width, height);
        let mut radius = self.params.min_radius.clamp(1, max_radius);
        let mut schedule = vec![radius];

        while radius < max_radius {
            let next = match self.params.expansion {
                RadiusExpansion::Doubling => radius.saturating_mul(2),
                RadiusExpansion::FixedStep(step) => radius.saturating_add(step.max(1)),
            };
            radius = next.min(max_radius);
            schedule.push(radius);
        }

        schedule
    }

    /// IDW estimate at `(row, col)` from Normal pixels only
    pub fn interpolate(
        &self,
        data: &BandImage,
        mask: &ValidityMask,
        row: usize,
        col: usize,
    ) -> ThermalResult<Interpolation> {
        let (height, width) = data.dim();

        if mask.get((row, col)) == Some(&ValidityClass::Normal) {
            return Ok(Interpolation {
                value: data[[row, col]] as f64,
                neighbors: 1,
                radius: 0,
            });
        }

        let schedule = self.radius_schedule(width, height);
        let min_neighbors = self.params.min_neighbors.max(1);

        for &radius in &schedule {
            let r2 = (radius * radius) as i64;
            let row_start = row.saturating_sub(radius);
            let row_end = (row + radius + 1).min(height);
            let col_start = col.saturating_sub(radius);
            let col_end = (col + radius + 1).min(width);

            let mut weight_sum = 0.0f64;
            let mut weighted_sum = 0.0f64;
            let mut neighbors = 0usize;

            for r in row_start..row_end {
                let dr = r as i64 - row as i64;
                for c in col_start..col_end {
                    let dc = c as i64 - col as i64;
                    let d2 = dr * dr + dc * dc;
                    if d2 == 0 || d2 > r2 || mask[[r, c]] != ValidityClass::Normal {
                        continue;
                    }
                    let weight = 1.0 / d2 as f64;
                    weight_sum += weight;
                    weighted_sum += data[[r, c]] as f64 * weight;
                    neighbors += 1;
                }
            }

            if neighbors >= min_neighbors {
                let value = weighted_sum / weight_sum;
                log::debug!(
                    "Interpolated ({}, {}) from {} neighbors within {}px: {:.2}",
                    row, col, neighbors, radius, value
                );
                return Ok(Interpolation {
                    value,
                    neighbors,
                    radius,
                });
            }
        }

        let max_radius = schedule.last().copied().unwrap_or(0);
        log::debug!("No Normal pixels within {}px of ({}, {})", max_radius, row, col);
        Err(ThermalError::NoValidNeighbors { row, col, max_radius })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn empty(size: usize) -> (BandImage, ValidityMask) {
        (
            Array2::from_elem((size, size), -9999.0),
            Array2::from_elem((size, size), ValidityClass::NoData),
        )
    }

    fn set_normal(data: &mut BandImage, mask: &mut ValidityMask, row: usize, col: usize, value: f32) {
        data[[row, col]] = value;
        mask[[row, col]] = ValidityClass::Normal;
    }

    #[test]
    fn test_idw_reference_example() {
        let (mut data, mut mask) = empty(100);
        set_normal(&mut data, &mut mask, 50, 52, 30.0);
        set_normal(&mut data, &mut mask, 50, 46, 24.0);

        let result = NoDataInterpolator::standard()
            .interpolate(&data, &mask, 50, 50)
            .unwrap();
        // (30*0.25 + 24*0.0625) / 0.3125
        assert_relative_eq!(result.value, 28.8, epsilon = 1e-12);
        assert_eq!(result.neighbors, 2);
        assert_eq!(result.radius, 20);
    }

    #[test]
    fn test_normal_pixel_returned_directly() {
        let (mut data, mut mask) = empty(10);
        set_normal(&mut data, &mut mask, 3, 3, 17.5);
        let result = NoDataInterpolator::standard().interpolate(&data, &mask, 3, 3).unwrap();
        assert_eq!(result.value, 17.5);
        assert_eq!(result.radius, 0);
    }

    #[test]
    fn test_unusual_pixels_are_not_sources() {
        let (mut data, mut mask) = empty(50);
        data[[10, 11]] = -40.0;
        mask[[10, 11]] = ValidityClass::Unusual;
        let err = NoDataInterpolator::standard()
            .interpolate(&data, &mask, 10, 10)
            .unwrap_err();
        assert!(matches!(err, ThermalError::NoValidNeighbors { max_radius: 10, .. }));
    }

    #[test]
    fn test_neighbor_beyond_max_radius_ignored() {
        // max radius = ceil(0.2 * 100) = 20
        let (mut data, mut mask) = empty(100);
        set_normal(&mut data, &mut mask, 0, 0, 20.0);
        let interpolator = NoDataInterpolator::standard();
        assert!(interpolator.interpolate(&data, &mask, 20, 20).is_err());

        set_normal(&mut data, &mut mask, 30, 30, 25.0);
        let result = interpolator.interpolate(&data, &mask, 20, 20).unwrap();
        // Only (30, 30) lies within the Euclidean radius
        assert_eq!(result.neighbors, 1);
        assert_eq!(result.value, 25.0);
    }

    #[test]
    fn test_stops_at_first_radius_with_neighbors() {
        let params = InterpolationParams {
            min_radius: 5,
            expansion: RadiusExpansion::FixedStep(5),
            ..InterpolationParams::default()
        };
        let interpolator = NoDataInterpolator::new(params);
        assert_eq!(interpolator.radius_schedule(100, 80), vec![5, 10, 15, 20]);

        let (mut data, mut mask) = empty(100);
        set_normal(&mut data, &mut mask, 50, 58, 10.0);
        set_normal(&mut data, &mut mask, 50, 65, 40.0);
        let result = interpolator.interpolate(&data, &mask, 50, 50).unwrap();
        assert_eq!(result.radius, 10);
        assert_eq!(result.neighbors, 1);
        assert_eq!(result.value, 10.0);
    }

    #[test]
    fn test_doubling_schedule_capped() {
        let interpolator = NoDataInterpolator::standard();
        // 20% of 2000 = 400
        assert_eq!(interpolator.radius_schedule(2000, 1000), vec![50, 100, 200, 400]);
        // 20% of 1200 = 240
        assert_eq!(interpolator.radius_schedule(1200, 300), vec![50, 100, 200, 240]);
        // Small images never search beyond their own maximum
        assert_eq!(interpolator.radius_schedule(100, 100), vec![20]);
    }
}
