//! moraine: A Fast, Modular Watershed Hazard Indicator Processor
//!
//! This library derives hazard and environmental indicators for a
//! mountain watershed from multi-source remote-sensing rasters and
//! vector boundaries: surface-water extent, terrain slope/aspect,
//! precipitation and temperature time series, glacier
//! thickness/velocity proxies, and supervised rockfall and
//! glacial-lake-outburst-flood classifications.
//!
//! It is a pure computation library: imagery arrives through the
//! [`source::RasterSource`] boundary and every output layer carries the
//! grid and provenance metadata an external exporter needs.

pub mod core;
pub mod pipeline;
pub mod source;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    AnalysisError, AnalysisResult, BoundingBox, Composite, GeoTransform, GridImage, GridValue,
    LabeledPoint, Mask, PeriodKey, Polygon, Raster, RasterCollection, RasterGrid, Scene,
    TimeSeriesEntry, TrainingSample, NO_DATA,
};

pub use crate::core::{
    aggregate_by_period, build_time_series, reduce_collection, reduce_region, CompositeReducer,
    Connectivity, HazardClassifier, IndexParams, PeriodBinning, RandomForestModel,
    RandomForestParams, SpectralIndexer, TerrainAnalyzer, TerrainParams, Vectorizer, FLAT_ASPECT,
};

pub use pipeline::{run, GlacierSummary, PipelineConfig, PipelineInputs, WatershedIndicators};
pub use source::{QualityFilter, RasterSource};
