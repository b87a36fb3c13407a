//! End-to-end indicator run for one watershed
//!
//! Executes the fixed indicator set over a study area: surface-water
//! extent, terrain derivatives with glacier proxies, precipitation
//! climatology, temperature time series, and the two supervised hazard
//! classifications. The branches are independent; a raster-archive
//! failure in one branch degrades that branch to an empty/no-data
//! output and the run continues. Classifier training failures are
//! fatal, reported before any classification is attempted.

use crate::core::classify::{HazardClassifier, RandomForestParams};
use crate::core::spectral::{IndexParams, SpectralIndexer};
use crate::core::temporal::{
    aggregate_by_period, build_time_series, reduce_collection, reduce_region, CompositeReducer,
    PeriodBinning,
};
use crate::core::terrain::TerrainAnalyzer;
use crate::core::vectorize::{Connectivity, Vectorizer};
use crate::source::{QualityFilter, RasterSource};
use crate::types::{
    AnalysisResult, BoundingBox, GridValue, LabeledPoint, Mask, Polygon, Raster, RasterCollection,
    TimeSeriesEntry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tunable parameters of an indicator run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bands of the water index (numerator-positive first)
    pub water_band_a: String,
    pub water_band_b: String,
    /// Index threshold above which a pixel counts as water
    pub water_threshold: GridValue,
    /// Scenes cloudier than this are excluded from composites
    pub max_cloud_fraction: f32,
    /// Threshold elevation for the glacier proxies, in meters
    pub snowline_elevation: GridValue,
    /// Velocity proxy scaling factor
    pub velocity_factor: GridValue,
    /// Precipitation band name in the archive
    pub precipitation_band: String,
    /// Land-surface-temperature band name in the archive
    pub temperature_band: String,
    /// Random forest size for both hazard problems
    pub tree_count: usize,
    /// Seed for reproducible classifier training
    pub seed: u64,
    /// Sampling resolution for zonal reduction, in world units
    pub region_scale: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            water_band_a: "B3".to_string(),
            water_band_b: "B8".to_string(),
            water_threshold: 0.3,
            max_cloud_fraction: 0.2,
            snowline_elevation: 5000.0,
            velocity_factor: 1.5,
            precipitation_band: "precipitation".to_string(),
            temperature_band: "lst".to_string(),
            tree_count: 50,
            seed: 42,
            region_scale: 30.0,
        }
    }
}

/// Fixed vector and training inputs of a run, injected by the caller
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Study-area boundary, consumed read-only
    pub boundary: Polygon,
    /// Glacier extent polygons, consumed read-only
    pub glacier_extent: Vec<Polygon>,
    /// Elevation raster with an "elevation" band
    pub dem: Raster,
    /// Hand-curated rockfall training locations
    pub rockfall_points: Vec<LabeledPoint>,
    /// Hand-curated outburst-flood training locations
    pub glof_points: Vec<LabeledPoint>,
    pub date_range: (DateTime<Utc>, DateTime<Utc>),
}

/// Zonal glacier-proxy means over one glacier polygon
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlacierSummary {
    pub mean_thickness: GridValue,
    pub mean_velocity: GridValue,
}

/// All output layers and tables of one indicator run
#[derive(Debug, Clone)]
pub struct WatershedIndicators {
    /// Water index raster, when optical imagery was available
    pub water_index: Option<Raster>,
    pub water_mask: Option<Mask>,
    /// One polygon per detected water body
    pub water_bodies: Vec<Polygon>,
    pub slope: Raster,
    pub aspect: Raster,
    pub thickness: Raster,
    pub velocity: Raster,
    /// Proxy means per glacier polygon, in input order
    pub glacier_summaries: Vec<GlacierSummary>,
    /// Monthly climatology; NaN entries are unmeasured months
    pub precipitation_by_month: Vec<TimeSeriesEntry>,
    /// Per-date series; NaN entries are cloud-failed dates
    pub temperature_by_date: Vec<TimeSeriesEntry>,
    pub rockfall: Raster,
    pub glof: Raster,
}

/// Run the full indicator set for one watershed.
pub fn run<S: RasterSource>(
    source: &S,
    inputs: &PipelineInputs,
    config: &PipelineConfig,
) -> AnalysisResult<WatershedIndicators> {
    let bounds = inputs.dem.grid().bounding_box();
    log::info!(
        "Starting indicator run over {}x{} grid, {} to {}",
        inputs.dem.grid().rows,
        inputs.dem.grid().cols,
        inputs.date_range.0,
        inputs.date_range.1
    );

    // Terrain branch: slope/aspect and the glacier proxies
    let analyzer = TerrainAnalyzer::default();
    let (slope, aspect) = analyzer.slope_aspect(&inputs.dem)?;
    let (thickness, velocity) = analyzer.estimate_thickness(
        &inputs.dem,
        &slope,
        config.snowline_elevation,
        config.velocity_factor,
    )?;

    let mut glacier_summaries = Vec::with_capacity(inputs.glacier_extent.len());
    for glacier in &inputs.glacier_extent {
        glacier_summaries.push(GlacierSummary {
            mean_thickness: reduce_region(&thickness, "thickness", glacier, config.region_scale)?,
            mean_velocity: reduce_region(&velocity, "velocity", glacier, config.region_scale)?,
        });
    }

    // Water branch: index, mask and vectorized water bodies
    let optical = fetch_or_empty(
        source,
        &[config.water_band_a.as_str(), config.water_band_b.as_str()],
        &bounds,
        inputs.date_range,
        &QualityFilter::max_cloud(config.max_cloud_fraction),
        "optical",
    );
    let (water_index, water_mask, water_bodies) = if optical.is_empty() {
        log::warn!("No optical scenes; skipping water extent");
        (None, None, Vec::new())
    } else {
        let composite = reduce_collection(
            &optical,
            CompositeReducer::CloudFreeMedian { max_cloud_fraction: config.max_cloud_fraction },
        )?;
        let indexer = SpectralIndexer::new(IndexParams::new(
            &config.water_band_a,
            &config.water_band_b,
            "ndwi",
        ));
        let index = indexer.compute_index(composite.raster())?;
        let mask = indexer.threshold(&index, config.water_threshold)?;
        let bodies = Vectorizer::new(Connectivity::Eight).vectorize(&mask);
        (Some(index), Some(mask), bodies)
    };

    // Climatology branch: monthly precipitation means over the boundary
    let precipitation = fetch_or_empty(
        source,
        &[config.precipitation_band.as_str()],
        &bounds,
        inputs.date_range,
        &QualityFilter::default(),
        "precipitation",
    );
    let precipitation_by_month = if precipitation.is_empty() {
        Vec::new()
    } else {
        let composites =
            aggregate_by_period(&precipitation, PeriodBinning::MonthOfYear, CompositeReducer::Mean)?;
        build_time_series(
            &composites,
            &config.precipitation_band,
            &inputs.boundary,
            config.region_scale,
        )?
    };

    // Temperature branch: cloud-filtered per-date series over the boundary
    let temperature = fetch_or_empty(
        source,
        &[config.temperature_band.as_str()],
        &bounds,
        inputs.date_range,
        &QualityFilter::default(),
        "temperature",
    );
    let temperature_by_date = if temperature.is_empty() {
        Vec::new()
    } else {
        let composites = aggregate_by_period(
            &temperature,
            PeriodBinning::Date,
            CompositeReducer::CloudFreeMedian { max_cloud_fraction: config.max_cloud_fraction },
        )?;
        build_time_series(
            &composites,
            &config.temperature_band,
            &inputs.boundary,
            config.region_scale,
        )?
    };

    // Hazard branch: one feature stack, two training sets, two models.
    // Training failures are fatal per the error taxonomy.
    let feature_stack = match &water_index {
        Some(index) => Raster::stack(&[&inputs.dem, &slope, index])?,
        None => Raster::stack(&[&inputs.dem, &slope, &aspect])?,
    };
    let classifier = HazardClassifier::new(RandomForestParams {
        tree_count: config.tree_count,
        seed: config.seed,
        ..RandomForestParams::default()
    });

    let rockfall_samples = classifier.extract_features(&feature_stack, &inputs.rockfall_points);
    let rockfall_model = classifier.train(&rockfall_samples)?;
    let rockfall = classifier.classify(&rockfall_model, &feature_stack)?;

    let glof_samples = classifier.extract_features(&feature_stack, &inputs.glof_points);
    let glof_model = classifier.train(&glof_samples)?;
    let glof = classifier.classify(&glof_model, &feature_stack)?;

    log::info!(
        "Indicator run complete: {} water bodies, {} precipitation entries, {} temperature entries",
        water_bodies.len(),
        precipitation_by_month.len(),
        temperature_by_date.len()
    );

    Ok(WatershedIndicators {
        water_index,
        water_mask,
        water_bodies,
        slope,
        aspect,
        thickness,
        velocity,
        glacier_summaries,
        precipitation_by_month,
        temperature_by_date,
        rockfall,
        glof,
    })
}

/// Fetch one branch's collection; an archive failure degrades the
/// branch to an empty collection instead of failing the run
fn fetch_or_empty<S: RasterSource>(
    source: &S,
    bands: &[&str],
    bounds: &BoundingBox,
    date_range: (DateTime<Utc>, DateTime<Utc>),
    quality: &QualityFilter,
    branch: &str,
) -> RasterCollection {
    match source.fetch_collection(bands, bounds, date_range, quality) {
        Ok(collection) => {
            log::debug!("Fetched {} {} scenes", collection.len(), branch);
            collection
        }
        Err(e) => {
            log::warn!("Fetch failed for {} branch: {}; treating as missing data", branch, e);
            RasterCollection::empty()
        }
    }
}
