use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use moraine::core::temporal::{
    aggregate_by_period, build_time_series, reduce_collection, reduce_region, CompositeReducer,
    PeriodBinning,
};
use moraine::types::{
    GeoTransform, PeriodKey, Polygon, Raster, RasterCollection, RasterGrid, Scene,
};
use ndarray::Array2;

fn grid(rows: usize, cols: usize) -> RasterGrid {
    let transform = GeoTransform::north_up(0.0, rows as f64 * 10.0, 10.0);
    RasterGrid::new(transform, rows, cols, 32645)
}

fn constant_scene(value: f32, year: i32, month: u32, day: u32, cloud: f32) -> Scene {
    let data = Array2::from_elem((4, 4), value);
    let raster = Raster::single_band(grid(4, 4), "precipitation", data).expect("raster");
    Scene {
        raster,
        timestamp: Utc.with_ymd_and_hms(year, month, day, 10, 30, 0).unwrap(),
        cloud_fraction: cloud,
    }
}

fn full_boundary() -> Polygon {
    Polygon::from_bounding_box(&grid(4, 4).bounding_box())
}

#[test]
fn test_synthetic_year_produces_twelve_ordered_periods() {
    let scenes: Vec<Scene> = (1..=12)
        .map(|m| constant_scene(m as f32, 2023, m, 15, 0.0))
        .collect();
    let collection = RasterCollection::new(scenes).expect("collection");

    let composites =
        aggregate_by_period(&collection, PeriodBinning::MonthOfYear, CompositeReducer::Mean)
            .expect("aggregate");

    assert_eq!(composites.len(), 12);
    for (i, (key, composite)) in composites.iter().enumerate() {
        assert_eq!(*key, PeriodKey::Month(i as u32 + 1));
        // Each period composite is built from exactly one contributing tile
        assert_eq!(composite.source_timestamps().len(), 1);
        let band = composite.raster().band("precipitation").unwrap();
        assert_relative_eq!(band[[2, 2]], (i + 1) as f32);
    }
}

#[test]
fn test_missing_month_yields_no_data_entry() {
    // No December scene
    let scenes: Vec<Scene> = (1..=11)
        .map(|m| constant_scene(10.0 * m as f32, 2023, m, 1, 0.0))
        .collect();
    let collection = RasterCollection::new(scenes).expect("collection");

    let composites =
        aggregate_by_period(&collection, PeriodBinning::MonthOfYear, CompositeReducer::Mean)
            .expect("aggregate");
    assert_eq!(composites.len(), 12);
    assert!(composites[11].1.is_no_data());

    let series = build_time_series(&composites, "precipitation", &full_boundary(), 10.0)
        .expect("time series");
    assert_eq!(series.len(), 12);
    assert_eq!(series[11].period, PeriodKey::Month(12));
    assert!(
        series[11].value.is_nan(),
        "unmeasured month must carry the sentinel, not be dropped"
    );
    assert_relative_eq!(series[0].value, 10.0);
}

#[test]
fn test_mean_composite_averages_scenes() {
    let scenes = vec![
        constant_scene(10.0, 2023, 6, 1, 0.0),
        constant_scene(30.0, 2023, 6, 21, 0.0),
    ];
    let collection = RasterCollection::new(scenes).expect("collection");
    let composites =
        aggregate_by_period(&collection, PeriodBinning::MonthOfYear, CompositeReducer::Mean)
            .expect("aggregate");

    let june = &composites[5].1;
    assert_eq!(june.source_timestamps().len(), 2);
    let band = june.raster().band("precipitation").unwrap();
    assert_relative_eq!(band[[0, 0]], 20.0);
}

#[test]
fn test_cloud_filtered_median() {
    let scenes = vec![
        constant_scene(10.0, 2023, 7, 1, 0.0),
        constant_scene(20.0, 2023, 7, 11, 0.1),
        constant_scene(99.0, 2023, 7, 21, 0.9),
    ];
    let collection = RasterCollection::new(scenes).expect("collection");

    let reducer = CompositeReducer::CloudFreeMedian { max_cloud_fraction: 0.5 };
    let composites = aggregate_by_period(&collection, PeriodBinning::MonthOfYear, reducer)
        .expect("aggregate");

    let july = &composites[6].1;
    // The cloudy scene is excluded from the composite and its provenance
    assert_eq!(july.source_timestamps().len(), 2);
    let band = july.raster().band("precipitation").unwrap();
    assert_relative_eq!(band[[1, 1]], 15.0);
}

#[test]
fn test_all_scenes_cloud_filtered_is_no_data() {
    let scenes = vec![constant_scene(10.0, 2023, 7, 1, 0.8)];
    let collection = RasterCollection::new(scenes).expect("collection");

    let reducer = CompositeReducer::CloudFreeMedian { max_cloud_fraction: 0.5 };
    let composites = aggregate_by_period(&collection, PeriodBinning::MonthOfYear, reducer)
        .expect("aggregate");
    assert!(composites[6].1.is_no_data());
}

#[test]
fn test_date_binning_emits_observed_dates_in_order() {
    let scenes = vec![
        constant_scene(5.0, 2023, 8, 20, 0.0),
        constant_scene(3.0, 2023, 8, 5, 0.0),
        constant_scene(4.0, 2023, 9, 1, 0.0),
    ];
    let collection = RasterCollection::new(scenes).expect("collection");

    let composites =
        aggregate_by_period(&collection, PeriodBinning::Date, CompositeReducer::Mean)
            .expect("aggregate");
    assert_eq!(composites.len(), 3);
    let keys: Vec<PeriodKey> = composites.iter().map(|(k, _)| *k).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_empty_collection_aggregates_to_nothing() {
    let collection = RasterCollection::empty();
    let composites =
        aggregate_by_period(&collection, PeriodBinning::MonthOfYear, CompositeReducer::Mean)
            .expect("aggregate");
    assert!(composites.is_empty());
}

#[test]
fn test_misaligned_collection_is_an_error() {
    let good = constant_scene(1.0, 2023, 1, 1, 0.0);
    let data = Array2::from_elem((8, 8), 1.0f32);
    let bad = Scene {
        raster: Raster::single_band(grid(8, 8), "precipitation", data).unwrap(),
        timestamp: Utc.with_ymd_and_hms(2023, 2, 1, 0, 0, 0).unwrap(),
        cloud_fraction: 0.0,
    };
    // The shared band schema passes construction; the grid mismatch
    // surfaces at aggregation time
    let collection = RasterCollection::new(vec![good, bad]).expect("collection");
    assert!(
        aggregate_by_period(&collection, PeriodBinning::MonthOfYear, CompositeReducer::Mean)
            .is_err()
    );
}

#[test]
fn test_reduce_region_uniform_field_is_scale_invariant() {
    let data = Array2::from_elem((4, 4), 7.5f32);
    let raster = Raster::single_band(grid(4, 4), "precipitation", data).unwrap();
    let boundary = full_boundary();

    for scale in [5.0, 10.0, 20.0, 40.0] {
        let value = reduce_region(&raster, "precipitation", &boundary, scale).expect("reduce");
        assert_relative_eq!(value, 7.5, epsilon = 1e-6);
    }
}

#[test]
fn test_reduce_region_pixel_center_rule() {
    // Geometry covering only the top-left pixel's center
    let mut data = Array2::from_elem((4, 4), 100.0f32);
    data[[0, 0]] = 2.0;
    let raster = Raster::single_band(grid(4, 4), "precipitation", data).unwrap();

    let boundary = Polygon::new(vec![(0.0, 30.0), (10.0, 30.0), (10.0, 40.0), (0.0, 40.0)]);
    let value = reduce_region(&raster, "precipitation", &boundary, 10.0).expect("reduce");
    assert_relative_eq!(value, 2.0);
}

#[test]
fn test_reduce_region_without_coverage_is_no_data() {
    let data = Array2::from_elem((4, 4), 1.0f32);
    let raster = Raster::single_band(grid(4, 4), "precipitation", data).unwrap();

    let far_away = Polygon::new(vec![(1e6, 1e6), (1e6 + 10.0, 1e6), (1e6, 1e6 + 10.0)]);
    let value = reduce_region(&raster, "precipitation", &far_away, 10.0).expect("reduce");
    assert!(value.is_nan());
}

#[test]
fn test_reduce_collection_single_composite() {
    let scenes = vec![
        constant_scene(1.0, 2023, 5, 1, 0.0),
        constant_scene(3.0, 2023, 6, 1, 0.0),
        constant_scene(5.0, 2023, 7, 1, 0.0),
    ];
    let collection = RasterCollection::new(scenes).expect("collection");
    let composite = reduce_collection(&collection, CompositeReducer::Mean).expect("composite");

    assert_eq!(composite.source_timestamps().len(), 3);
    let band = composite.raster().band("precipitation").unwrap();
    assert_relative_eq!(band[[0, 0]], 3.0);
}

#[test]
fn test_time_series_sorted_by_period_not_input_order() {
    let scenes = vec![
        constant_scene(2.0, 2023, 2, 1, 0.0),
        constant_scene(1.0, 2023, 1, 1, 0.0),
    ];
    let collection = RasterCollection::new(scenes).expect("collection");
    let mut composites =
        aggregate_by_period(&collection, PeriodBinning::MonthOfYear, CompositeReducer::Mean)
            .expect("aggregate");
    // Feed the builder a deliberately scrambled sequence
    composites.reverse();

    let series = build_time_series(&composites, "precipitation", &full_boundary(), 10.0)
        .expect("time series");
    for window in series.windows(2) {
        assert!(window[0].period < window[1].period);
    }
}
