//! Normalized band-difference indices and threshold masking
//!
//! Computes a normalized difference between two bands of a composite
//! raster, `(a - b) / (a + b)`, and thresholds it into a binary mask.
//! With green and near-infrared bands this is the McFeeters NDWI used
//! for surface-water detection.

use crate::types::{
    AnalysisError, AnalysisResult, GridValue, Mask, Raster, NO_DATA,
};
use ndarray::Array2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Parameters for a normalized-difference index
#[derive(Debug, Clone)]
pub struct IndexParams {
    /// Numerator-positive band (e.g. green for NDWI)
    pub band_a: String,
    /// Numerator-negative band (e.g. NIR for NDWI)
    pub band_b: String,
    /// Band name given to the output raster
    pub output_band: String,
}

impl IndexParams {
    pub fn new(band_a: &str, band_b: &str, output_band: &str) -> Self {
        Self {
            band_a: band_a.to_string(),
            band_b: band_b.to_string(),
            output_band: output_band.to_string(),
        }
    }
}

impl Default for IndexParams {
    fn default() -> Self {
        // NDWI over Sentinel-2 style band names
        Self::new("B3", "B8", "ndwi")
    }
}

/// Normalized-difference index processor
pub struct SpectralIndexer {
    params: IndexParams,
}

impl SpectralIndexer {
    pub fn new(params: IndexParams) -> Self {
        Self { params }
    }

    /// Compute the index raster `(a - b) / (a + b)` per pixel.
    ///
    /// Where the denominator is (near-)zero, or either band is no-data,
    /// the output cell is the NaN no-data sentinel. Everywhere else the
    /// result lies in [-1, 1].
    pub fn compute_index(&self, raster: &Raster) -> AnalysisResult<Raster> {
        log::info!(
            "Computing normalized difference ({} - {}) / ({} + {})",
            self.params.band_a,
            self.params.band_b,
            self.params.band_a,
            self.params.band_b
        );

        let band_a = raster.band(&self.params.band_a)?;
        let band_b = raster.band(&self.params.band_b)?;

        let (rows, cols) = band_a.dim();

        let index_row = |row: usize| -> Vec<GridValue> {
            let mut row_data = vec![NO_DATA; cols];
            for col in 0..cols {
                let a = band_a[[row, col]];
                let b = band_b[[row, col]];
                if !a.is_finite() || !b.is_finite() {
                    continue;
                }
                let sum = a + b;
                if sum.abs() < 1e-10 {
                    continue; // Undefined index; propagate no-data
                }
                row_data[col] = (a - b) / sum;
            }
            row_data
        };

        #[cfg(feature = "parallel")]
        let data: Vec<GridValue> = (0..rows).into_par_iter().flat_map(index_row).collect();

        #[cfg(not(feature = "parallel"))]
        let data: Vec<GridValue> = (0..rows).flat_map(index_row).collect();

        let image = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| AnalysisError::Processing(format!("failed to shape index data: {}", e)))?;

        Raster::single_band(raster.grid().clone(), &self.params.output_band, image)
    }

    /// Threshold the index into a binary mask: set iff value > t.
    ///
    /// No-data cells map to 0. This is an explicit policy: an unmeasured
    /// pixel is never detected as water.
    pub fn threshold(&self, index: &Raster, t: GridValue) -> AnalysisResult<Mask> {
        log::debug!("Thresholding {} at {}", self.params.output_band, t);

        let band = index.band(&self.params.output_band)?;
        let data = band.mapv(|v| if v.is_finite() && v > t { 1u8 } else { 0u8 });

        let mask = Mask::new(index.grid().clone(), data)?;
        log::info!(
            "Threshold {} produced {} set pixels of {}",
            t,
            mask.count_set(),
            index.grid().rows * index.grid().cols
        );
        Ok(mask)
    }
}

impl Default for SpectralIndexer {
    fn default() -> Self {
        Self::new(IndexParams::default())
    }
}
