//! Terrain derivatives and glacier proxies
//!
//! Slope and aspect are computed from an elevation raster with the Horn
//! (1981) 3x3 finite-difference kernel. The glacier thickness and
//! velocity layers are fixed approximation formulas driven by slope and
//! a threshold snowline elevation; they are proxies, not physical
//! models, and carry no accuracy claim beyond reproducing the formula.

use crate::types::{AnalysisError, AnalysisResult, GridValue, Raster, NO_DATA};
use ndarray::Array2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Aspect value assigned to flat pixels (slope = 0), where the
/// downslope bearing is undefined
pub const FLAT_ASPECT: GridValue = -1.0;

/// Gradient magnitude below which a pixel is treated as flat
const FLAT_THRESHOLD: GridValue = 1e-10;

/// Parameters for terrain derivative computation
#[derive(Debug, Clone)]
pub struct TerrainParams {
    /// Elevation band name in the input raster
    pub elevation_band: String,
    /// Vertical exaggeration factor applied to elevations
    pub z_factor: f64,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            elevation_band: "elevation".to_string(),
            z_factor: 1.0,
        }
    }
}

/// Terrain derivative processor
pub struct TerrainAnalyzer {
    params: TerrainParams,
}

impl TerrainAnalyzer {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    /// Derive slope and aspect rasters from an elevation raster.
    ///
    /// Slope is in degrees, clamped to [0, 90]. Aspect is the compass
    /// bearing of the downslope direction in degrees [0, 360); flat
    /// pixels get [`FLAT_ASPECT`]. Border pixels and pixels with an
    /// incomplete 3x3 neighborhood are no-data.
    pub fn slope_aspect(&self, dem: &Raster) -> AnalysisResult<(Raster, Raster)> {
        log::info!(
            "Deriving slope/aspect from '{}' ({}x{})",
            self.params.elevation_band,
            dem.grid().rows,
            dem.grid().cols
        );

        let elevation = dem.band(&self.params.elevation_band)?;
        let (rows, cols) = elevation.dim();
        let cell_size = (dem.grid().pixel_size() * self.params.z_factor) as GridValue;
        if cell_size <= 0.0 {
            return Err(AnalysisError::InvalidInput(
                "grid pixel size must be positive".to_string(),
            ));
        }
        let eight_cell = 8.0 * cell_size;

        let derive_row = |row: usize| -> Vec<(GridValue, GridValue)> {
            let mut row_data = vec![(NO_DATA, NO_DATA); cols];
            if row == 0 || row == rows - 1 {
                return row_data;
            }
            for col in 1..cols - 1 {
                // Horn 3x3 neighborhood:
                //   a b c
                //   d e f
                //   g h i
                let a = elevation[[row - 1, col - 1]];
                let b = elevation[[row - 1, col]];
                let c = elevation[[row - 1, col + 1]];
                let d = elevation[[row, col - 1]];
                let e = elevation[[row, col]];
                let f = elevation[[row, col + 1]];
                let g = elevation[[row + 1, col - 1]];
                let h = elevation[[row + 1, col]];
                let i = elevation[[row + 1, col + 1]];

                if [a, b, c, d, e, f, g, h, i].iter().any(|v| !v.is_finite()) {
                    continue;
                }

                let dz_dx = ((c + 2.0 * f + i) - (a + 2.0 * d + g)) / eight_cell;
                let dz_dy = ((g + 2.0 * h + i) - (a + 2.0 * b + c)) / eight_cell;

                let slope_deg = (dz_dx * dz_dx + dz_dy * dz_dy)
                    .sqrt()
                    .atan()
                    .to_degrees()
                    .clamp(0.0, 90.0);

                let aspect_deg = if dz_dx.abs() < FLAT_THRESHOLD && dz_dy.abs() < FLAT_THRESHOLD {
                    FLAT_ASPECT
                } else {
                    // Bearing of the downslope direction, clockwise from north
                    let mut bearing = (-dz_dx).atan2(dz_dy).to_degrees();
                    if bearing < 0.0 {
                        bearing += 360.0;
                    }
                    if bearing >= 360.0 {
                        bearing -= 360.0;
                    }
                    bearing
                };

                row_data[col] = (slope_deg, aspect_deg);
            }
            row_data
        };

        #[cfg(feature = "parallel")]
        let cells: Vec<(GridValue, GridValue)> =
            (0..rows).into_par_iter().flat_map(derive_row).collect();

        #[cfg(not(feature = "parallel"))]
        let cells: Vec<(GridValue, GridValue)> = (0..rows).flat_map(derive_row).collect();

        let mut slope = Array2::<GridValue>::zeros((rows, cols));
        let mut aspect = Array2::<GridValue>::zeros((rows, cols));
        for (idx, (s, asp)) in cells.into_iter().enumerate() {
            let (r, c) = (idx / cols, idx % cols);
            slope[[r, c]] = s;
            aspect[[r, c]] = asp;
        }

        Ok((
            Raster::single_band(dem.grid().clone(), "slope", slope)?,
            Raster::single_band(dem.grid().clone(), "aspect", aspect)?,
        ))
    }

    /// Estimate glacier thickness and surface velocity proxies.
    ///
    /// `thickness = slope * snowline_elevation / 100` where the terrain
    /// lies at or above the snowline, 0 below it (the glacier is absent,
    /// which reads as a measured zero, not a gap); `velocity =
    /// thickness * velocity_factor`. No-data cells in either input stay
    /// no-data.
    pub fn estimate_thickness(
        &self,
        dem: &Raster,
        slope: &Raster,
        snowline_elevation: GridValue,
        velocity_factor: GridValue,
    ) -> AnalysisResult<(Raster, Raster)> {
        dem.ensure_aligned(slope)?;
        log::info!(
            "Estimating glacier proxies (snowline {} m, velocity factor {})",
            snowline_elevation,
            velocity_factor
        );

        let elevation = dem.band(&self.params.elevation_band)?;
        let slope_band = slope.band("slope")?;
        let (rows, cols) = elevation.dim();

        let mut thickness = Array2::<GridValue>::from_elem((rows, cols), NO_DATA);
        let mut velocity = Array2::<GridValue>::from_elem((rows, cols), NO_DATA);

        for row in 0..rows {
            for col in 0..cols {
                let z = elevation[[row, col]];
                let s = slope_band[[row, col]];
                if !z.is_finite() || !s.is_finite() {
                    continue;
                }
                let t = if z >= snowline_elevation {
                    s * snowline_elevation / 100.0
                } else {
                    0.0
                };
                thickness[[row, col]] = t;
                velocity[[row, col]] = t * velocity_factor;
            }
        }

        Ok((
            Raster::single_band(dem.grid().clone(), "thickness", thickness)?,
            Raster::single_band(dem.grid().clone(), "velocity", velocity)?,
        ))
    }
}

impl Default for TerrainAnalyzer {
    fn default() -> Self {
        Self::new(TerrainParams::default())
    }
}
