//! External raster-archive boundary
//!
//! The core is a pure computation library; paging imagery out of a
//! remote archive is an external collaborator reached through
//! [`RasterSource`]. Implementations may fail per tile or return sparse
//! collections; the core treats both as data gaps, not pipeline
//! failures.

use crate::types::{AnalysisResult, BoundingBox, RasterCollection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scene-quality constraints passed to the archive
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityFilter {
    /// Drop scenes whose cloud fraction exceeds this value
    pub max_cloud_fraction: Option<f32>,
}

impl QualityFilter {
    pub fn max_cloud(fraction: f32) -> Self {
        Self { max_cloud_fraction: Some(fraction) }
    }
}

/// Supplier of time-stamped multi-band raster tiles for a bounding
/// geometry.
///
/// The returned collection is ordered by timestamp but is not
/// guaranteed to be gap-free or temporally uniform; callers must treat
/// missing periods as unmeasured data.
pub trait RasterSource {
    fn fetch_collection(
        &self,
        bands: &[&str],
        bounds: &BoundingBox,
        date_range: (DateTime<Utc>, DateTime<Utc>),
        quality: &QualityFilter,
    ) -> AnalysisResult<RasterCollection>;
}
