//! Core raster analysis modules

pub mod classify;
pub mod spectral;
pub mod temporal;
pub mod terrain;
pub mod vectorize;

// Re-export main types
pub use classify::{HazardClassifier, RandomForestModel, RandomForestParams};
pub use spectral::{IndexParams, SpectralIndexer};
pub use temporal::{
    aggregate_by_period, build_time_series, reduce_collection, reduce_region, CompositeReducer,
    PeriodBinning,
};
pub use terrain::{TerrainAnalyzer, TerrainParams, FLAT_ASPECT};
pub use vectorize::{Connectivity, Vectorizer};
