//! Temporal aggregation and zonal reduction
//!
//! Buckets a raster time series into calendar periods, reduces each
//! bucket into a per-pixel composite, and collapses composites over a
//! region geometry into an ordered scalar time series.
//!
//! Data gaps are values here, never errors: a period with no
//! contributing scene yields an all-NaN composite, and the matching
//! time-series entry carries the NaN sentinel instead of being dropped,
//! so downstream consumers can tell "zero measured" from "unmeasured".

use crate::types::{
    AnalysisError, AnalysisResult, Composite, GridValue, PeriodKey, Polygon, Raster,
    RasterCollection, Scene, TimeSeriesEntry, NO_DATA,
};
use chrono::{DateTime, Datelike, Utc};
use ndarray::Array3;
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Mapping from a scene timestamp to its aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodBinning {
    /// Calendar month across years (climatology); always emits keys
    /// 1..=12, with no-data composites for empty months
    MonthOfYear,
    /// Acquisition date; emits observed dates only
    Date,
}

impl PeriodBinning {
    pub fn key(&self, timestamp: DateTime<Utc>) -> PeriodKey {
        match self {
            PeriodBinning::MonthOfYear => PeriodKey::Month(timestamp.month()),
            PeriodBinning::Date => PeriodKey::Date(timestamp.date_naive()),
        }
    }
}

/// Per-pixel statistic used to reduce a period bucket into a composite
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositeReducer {
    /// Mean of all finite values across the bucket
    Mean,
    /// Median across bucket members whose cloud fraction does not
    /// exceed the filter
    CloudFreeMedian { max_cloud_fraction: f32 },
}

/// Bucket a collection into calendar periods and reduce each bucket
/// into a composite, ordered by period key.
///
/// All scenes must share the collection grid; misalignment is an input
/// error. An empty collection yields an empty sequence (there is no
/// grid to shape a no-data composite on).
pub fn aggregate_by_period(
    collection: &RasterCollection,
    binning: PeriodBinning,
    reducer: CompositeReducer,
) -> AnalysisResult<Vec<(PeriodKey, Composite)>> {
    if collection.is_empty() {
        log::warn!("Aggregating an empty collection; emitting no periods");
        return Ok(Vec::new());
    }

    let scenes = collection.scenes();
    let reference = &scenes[0].raster;
    for scene in scenes {
        reference.ensure_aligned(&scene.raster)?;
    }

    let mut buckets: BTreeMap<PeriodKey, Vec<&Scene>> = BTreeMap::new();
    for scene in scenes {
        buckets.entry(binning.key(scene.timestamp)).or_default().push(scene);
    }

    let period_keys: Vec<PeriodKey> = match binning {
        PeriodBinning::MonthOfYear => (1..=12).map(PeriodKey::Month).collect(),
        PeriodBinning::Date => buckets.keys().copied().collect(),
    };
    log::info!(
        "Aggregating {} scenes into {} periods ({:?}, {:?})",
        scenes.len(),
        period_keys.len(),
        binning,
        reducer
    );

    let build = |key: &PeriodKey| -> AnalysisResult<(PeriodKey, Composite)> {
        let members: Vec<&Scene> = buckets
            .get(key)
            .map(|b| {
                b.iter()
                    .filter(|s| match reducer {
                        CompositeReducer::Mean => true,
                        CompositeReducer::CloudFreeMedian { max_cloud_fraction } => {
                            s.cloud_fraction <= max_cloud_fraction
                        }
                    })
                    .copied()
                    .collect()
            })
            .unwrap_or_default();

        let composite = reduce_bucket(reference, &members, reducer)?;
        if composite.is_no_data() {
            log::debug!("Period {} has no contributing scene", key);
        }
        Ok((*key, composite))
    };

    #[cfg(feature = "parallel")]
    let composites: AnalysisResult<Vec<_>> = period_keys.par_iter().map(build).collect();

    #[cfg(not(feature = "parallel"))]
    let composites: AnalysisResult<Vec<_>> = period_keys.iter().map(build).collect();

    composites
}

/// Reduce a whole collection into one composite, ignoring period
/// bucketing.
///
/// The cloud filter of [`CompositeReducer::CloudFreeMedian`] still
/// applies; a collection whose scenes are all filtered out yields a
/// no-data composite. An empty collection is an input error, since
/// there is no grid to shape the composite on.
pub fn reduce_collection(
    collection: &RasterCollection,
    reducer: CompositeReducer,
) -> AnalysisResult<Composite> {
    let scenes = collection.scenes();
    let reference = match scenes.first() {
        Some(s) => &s.raster,
        None => {
            return Err(AnalysisError::InvalidInput(
                "cannot composite an empty collection".to_string(),
            ))
        }
    };
    for scene in scenes {
        reference.ensure_aligned(&scene.raster)?;
    }

    let members: Vec<&Scene> = scenes
        .iter()
        .filter(|s| match reducer {
            CompositeReducer::Mean => true,
            CompositeReducer::CloudFreeMedian { max_cloud_fraction } => {
                s.cloud_fraction <= max_cloud_fraction
            }
        })
        .collect();
    log::info!(
        "Compositing {} of {} scenes ({:?})",
        members.len(),
        scenes.len(),
        reducer
    );
    reduce_bucket(reference, &members, reducer)
}

/// Reduce the scenes of one period bucket into a composite. An empty
/// bucket yields an all-NaN no-data composite on the reference grid.
fn reduce_bucket(
    reference: &Raster,
    members: &[&Scene],
    reducer: CompositeReducer,
) -> AnalysisResult<Composite> {
    let (nb, rows, cols) = reference.data().dim();
    let mut data = Array3::<GridValue>::from_elem((nb, rows, cols), NO_DATA);

    if !members.is_empty() {
        let mut values: Vec<GridValue> = Vec::with_capacity(members.len());
        for b in 0..nb {
            for r in 0..rows {
                for c in 0..cols {
                    values.clear();
                    for scene in members {
                        let v = scene.raster.data()[[b, r, c]];
                        if v.is_finite() {
                            values.push(v);
                        }
                    }
                    if values.is_empty() {
                        continue;
                    }
                    data[[b, r, c]] = match reducer {
                        CompositeReducer::Mean => {
                            values.iter().map(|&v| v as f64).sum::<f64>() as GridValue
                                / values.len() as GridValue
                        }
                        CompositeReducer::CloudFreeMedian { .. } => median(&mut values),
                    };
                }
            }
        }
    }

    let raster = Raster::new(
        reference.grid().clone(),
        reference.band_names().to_vec(),
        data,
    )?;
    let timestamps = members.iter().map(|s| s.timestamp).collect();
    Ok(Composite::new(raster, timestamps))
}

fn median(values: &mut [GridValue]) -> GridValue {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    }
}

/// Reduce one band of a raster over a region geometry to its mean.
///
/// A pixel contributes iff its center falls inside the geometry and its
/// value is finite. `scale` is the sampling resolution in world units;
/// pixels are sampled every `max(1, round(scale / pixel_size))` cells,
/// so a uniform field reduces to the same value at any scale. Returns
/// NaN when the geometry covers no valid pixel.
pub fn reduce_region(
    raster: &Raster,
    band: &str,
    geometry: &Polygon,
    scale: f64,
) -> AnalysisResult<GridValue> {
    let values = raster.band(band)?;
    let grid = raster.grid();
    let step = sampling_step(scale, grid.pixel_size());

    let row_partial = |row: usize| -> (f64, usize) {
        let mut sum = 0.0f64;
        let mut count = 0usize;
        let mut col = 0;
        while col < grid.cols {
            let v = values[[row, col]];
            if v.is_finite() {
                let (x, y) = grid.pixel_center(row, col);
                if geometry.contains(x, y) {
                    sum += v as f64;
                    count += 1;
                }
            }
            col += step;
        }
        (sum, count)
    };

    // Partial sums are associative, so parallel row folds combine exactly
    #[cfg(feature = "parallel")]
    let (sum, count) = (0..raster.grid().rows)
        .into_par_iter()
        .step_by(step)
        .map(row_partial)
        .reduce(|| (0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    #[cfg(not(feature = "parallel"))]
    let (sum, count) = (0..raster.grid().rows)
        .step_by(step)
        .map(row_partial)
        .fold((0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    if count == 0 {
        log::debug!("Region covers no valid pixel of band '{}'", band);
        return Ok(NO_DATA);
    }
    Ok((sum / count as f64) as GridValue)
}

fn sampling_step(scale: f64, pixel_size: f64) -> usize {
    if scale <= 0.0 || pixel_size <= 0.0 {
        return 1;
    }
    ((scale / pixel_size).round() as usize).max(1)
}

/// Collapse ordered period composites into a scalar time series over a
/// region, strictly in period order.
///
/// No-data periods propagate the NaN sentinel rather than being
/// dropped.
pub fn build_time_series(
    composites: &[(PeriodKey, Composite)],
    band: &str,
    geometry: &Polygon,
    scale: f64,
) -> AnalysisResult<Vec<TimeSeriesEntry>> {
    let mut entries = Vec::with_capacity(composites.len());
    for (period, composite) in composites {
        let value = if composite.is_no_data() {
            NO_DATA
        } else {
            reduce_region(composite.raster(), band, geometry, scale)?
        };
        entries.push(TimeSeriesEntry { period: *period, value });
    }
    // Emission order is by period key, never by completion order
    entries.sort_by_key(|e| e.period);
    log::info!(
        "Built time series with {} entries ({} unmeasured)",
        entries.len(),
        entries.iter().filter(|e| !e.value.is_finite()).count()
    );
    Ok(entries)
}
