use moraine::core::spectral::{IndexParams, SpectralIndexer};
use moraine::core::vectorize::{Connectivity, Vectorizer};
use moraine::types::{GeoTransform, Raster, RasterGrid};
use ndarray::Array2;

fn grid(rows: usize, cols: usize) -> RasterGrid {
    let transform = GeoTransform::north_up(0.0, rows as f64 * 10.0, 10.0);
    RasterGrid::new(transform, rows, cols, 32645)
}

fn two_band_raster(green: Array2<f32>, nir: Array2<f32>) -> Raster {
    let (rows, cols) = green.dim();
    let g = Raster::single_band(grid(rows, cols), "B3", green).expect("green band");
    let n = Raster::single_band(grid(rows, cols), "B8", nir).expect("nir band");
    Raster::stack(&[&g, &n]).expect("stack")
}

#[test]
fn test_index_range_and_no_data() {
    let green = Array2::from_shape_vec(
        (2, 2),
        vec![80.0, 10.0, 5.0, 0.0],
    )
    .unwrap();
    let nir = Array2::from_shape_vec(
        (2, 2),
        vec![20.0, 90.0, -5.0, 0.0],
    )
    .unwrap();
    let raster = two_band_raster(green, nir);

    let indexer = SpectralIndexer::default();
    let index = indexer.compute_index(&raster).expect("index");
    let band = index.band("ndwi").expect("ndwi band");

    // Defined pixels lie in [-1, 1]
    assert!((band[[0, 0]] - 0.6).abs() < 1e-6);
    assert!((band[[0, 1]] + 0.8).abs() < 1e-6);

    // Zero denominator propagates as no-data, in both the 5/-5 and 0/0 cases
    assert!(band[[1, 0]].is_nan());
    assert!(band[[1, 1]].is_nan());
}

#[test]
fn test_index_no_data_input_propagates() {
    let mut green = Array2::from_elem((3, 3), 50.0f32);
    green[[1, 1]] = f32::NAN;
    let nir = Array2::from_elem((3, 3), 10.0f32);
    let raster = two_band_raster(green, nir);

    let index = SpectralIndexer::default().compute_index(&raster).expect("index");
    let band = index.band("ndwi").expect("band");
    assert!(band[[1, 1]].is_nan());
    assert!(band[[0, 0]].is_finite());
}

#[test]
fn test_threshold_monotonic() {
    let green = Array2::from_shape_vec(
        (2, 3),
        vec![90.0, 70.0, 55.0, 45.0, 30.0, 10.0],
    )
    .unwrap();
    let nir = Array2::from_elem((2, 3), 50.0f32);
    let raster = two_band_raster(green, nir);

    let indexer = SpectralIndexer::default();
    let index = indexer.compute_index(&raster).expect("index");

    let mut previous = usize::MAX;
    for t in [-1.0, -0.2, 0.0, 0.1, 0.5, 1.0] {
        let count = indexer.threshold(&index, t).expect("mask").count_set();
        assert!(
            count <= previous,
            "raising threshold to {} increased set pixels: {} > {}",
            t,
            count,
            previous
        );
        previous = count;
    }
}

#[test]
fn test_threshold_excludes_no_data() {
    let green = Array2::from_elem((2, 2), 0.0f32);
    let nir = Array2::from_elem((2, 2), 0.0f32);
    let raster = two_band_raster(green, nir);

    let indexer = SpectralIndexer::default();
    let index = indexer.compute_index(&raster).expect("index");

    // Every pixel is no-data; even a threshold below any real index
    // value must not detect water
    let mask = indexer.threshold(&index, -2.0).expect("mask");
    assert_eq!(mask.count_set(), 0);
}

#[test]
fn test_unknown_band_is_an_error() {
    let green = Array2::from_elem((2, 2), 10.0f32);
    let raster = Raster::single_band(grid(2, 2), "B3", green).unwrap();
    let indexer = SpectralIndexer::new(IndexParams::new("B3", "B8", "ndwi"));
    assert!(indexer.compute_index(&raster).is_err());
}

#[test]
fn test_water_detection_end_to_end() {
    // Top-left 2x2 block reads as water (index 0.6), the rest as land
    // (index -0.4); threshold then vectorize must yield exactly one
    // polygon covering the block
    let mut green = Array2::from_elem((4, 4), 30.0f32);
    let mut nir = Array2::from_elem((4, 4), 70.0f32);
    for r in 0..2 {
        for c in 0..2 {
            green[[r, c]] = 80.0;
            nir[[r, c]] = 20.0;
        }
    }
    let raster = two_band_raster(green, nir);

    let indexer = SpectralIndexer::default();
    let index = indexer.compute_index(&raster).expect("index");
    let mask = indexer.threshold(&index, 0.3).expect("mask");
    assert_eq!(mask.count_set(), 4);

    let polygons = Vectorizer::new(Connectivity::Eight).vectorize(&mask);
    assert_eq!(polygons.len(), 1);

    let water = &polygons[0];
    for r in 0..2 {
        for c in 0..2 {
            let (x, y) = mask.grid().pixel_center(r, c);
            assert!(water.contains(x, y), "block pixel ({}, {}) not covered", r, c);
        }
    }
    let (x, y) = mask.grid().pixel_center(2, 2);
    assert!(!water.contains(x, y), "land pixel wrongly covered");
}
