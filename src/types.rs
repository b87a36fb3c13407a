use chrono::{DateTime, NaiveDate, Utc};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Real-valued raster cell data
pub type GridValue = f32;

/// 2D single-band grid (rows x cols)
pub type GridImage = Array2<GridValue>;

/// 3D multi-band grid (band x rows x cols)
pub type BandCube = Array3<GridValue>;

/// No-data sentinel for raster cells. Distinct from a valid zero:
/// a NaN cell means "unmeasured", never "measured as zero".
pub const NO_DATA: GridValue = GridValue::NAN;

/// Geospatial bounding box in world coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

/// Geospatial transformation parameters (affine pixel-to-world mapping)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels and no rotation terms.
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_size: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: pixel_size,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -pixel_size,
        }
    }

    /// World coordinates of a pixel center
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64 + 0.5;
        let r = row as f64 + 0.5;
        let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
        let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
        (x, y)
    }

    /// World coordinates of a pixel corner (grid vertex)
    pub fn vertex(&self, row: usize, col: usize) -> (f64, f64) {
        let c = col as f64;
        let r = row as f64;
        let x = self.top_left_x + c * self.pixel_width + r * self.rotation_x;
        let y = self.top_left_y + c * self.rotation_y + r * self.pixel_height;
        (x, y)
    }
}

/// Spatial grid shared by a raster and everything derived from it.
///
/// Two rasters may enter per-pixel arithmetic only if their grids align
/// (same extent, resolution and EPSG code). Rotated grids are not
/// supported; the rotation terms exist only for interchange with
/// external metadata and must be zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterGrid {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub epsg: u32,
}

impl RasterGrid {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize, epsg: u32) -> Self {
        Self { transform, rows, cols, epsg }
    }

    /// Whether per-pixel arithmetic between this grid and `other` is valid
    pub fn aligns_with(&self, other: &RasterGrid) -> bool {
        const EPS: f64 = 1e-6;
        self.rows == other.rows
            && self.cols == other.cols
            && self.epsg == other.epsg
            && (self.transform.top_left_x - other.transform.top_left_x).abs() < EPS
            && (self.transform.top_left_y - other.transform.top_left_y).abs() < EPS
            && (self.transform.pixel_width - other.transform.pixel_width).abs() < EPS
            && (self.transform.pixel_height - other.transform.pixel_height).abs() < EPS
    }

    /// Pixel size in world units (assumes square pixels)
    pub fn pixel_size(&self) -> f64 {
        self.transform.pixel_width.abs()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let (x0, y0) = self.transform.vertex(0, 0);
        let (x1, y1) = self.transform.vertex(self.rows, self.cols);
        BoundingBox {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Pixel containing a world coordinate, or None if outside the grid
    pub fn locate(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let t = &self.transform;
        let col = (x - t.top_left_x) / t.pixel_width;
        let row = (y - t.top_left_y) / t.pixel_height;
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        if row < self.rows && col < self.cols {
            Some((row, col))
        } else {
            None
        }
    }

    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_center(row, col)
    }
}

/// An immutable multi-band raster over a fixed grid.
///
/// Band values are stored as (band, row, col); no-data cells are NaN.
/// Rasters are created by one processing step and never mutated.
#[derive(Debug, Clone)]
pub struct Raster {
    grid: RasterGrid,
    bands: Vec<String>,
    data: BandCube,
}

impl Raster {
    pub fn new(grid: RasterGrid, bands: Vec<String>, data: BandCube) -> AnalysisResult<Self> {
        let (nb, rows, cols) = data.dim();
        if nb != bands.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "band schema has {} names but data has {} bands",
                bands.len(),
                nb
            )));
        }
        if rows != grid.rows || cols != grid.cols {
            return Err(AnalysisError::InvalidInput(format!(
                "data shape {}x{} does not match grid {}x{}",
                rows, cols, grid.rows, grid.cols
            )));
        }
        Ok(Self { grid, bands, data })
    }

    /// Wrap a single 2D band into a raster
    pub fn single_band(grid: RasterGrid, name: &str, data: GridImage) -> AnalysisResult<Self> {
        let (rows, cols) = data.dim();
        let cube = data.into_shape((1, rows, cols)).map_err(|e| {
            AnalysisError::Processing(format!("failed to reshape band data: {}", e))
        })?;
        Self::new(grid, vec![name.to_string()], cube)
    }

    /// Stack aligned rasters into one multi-band raster.
    ///
    /// Band order follows the input order; duplicate band names are an
    /// input error.
    pub fn stack(rasters: &[&Raster]) -> AnalysisResult<Raster> {
        let first = rasters.first().ok_or_else(|| {
            AnalysisError::InvalidInput("cannot stack an empty raster list".to_string())
        })?;
        let mut bands = Vec::new();
        let mut views = Vec::new();
        for raster in rasters {
            first.ensure_aligned(raster)?;
            for (i, name) in raster.bands.iter().enumerate() {
                if bands.contains(name) {
                    return Err(AnalysisError::InvalidInput(format!(
                        "duplicate band '{}' in stack",
                        name
                    )));
                }
                bands.push(name.clone());
                views.push(raster.data.index_axis(Axis(0), i));
            }
        }
        let data = ndarray::stack(Axis(0), &views)
            .map_err(|e| AnalysisError::Processing(format!("band stack failed: {}", e)))?;
        Raster::new(first.grid.clone(), bands, data)
    }

    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    pub fn band_names(&self) -> &[String] {
        &self.bands
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn data(&self) -> &BandCube {
        &self.data
    }

    pub fn band_index(&self, name: &str) -> AnalysisResult<usize> {
        self.bands
            .iter()
            .position(|b| b == name)
            .ok_or_else(|| AnalysisError::InvalidInput(format!("unknown band '{}'", name)))
    }

    /// View of one band by name
    pub fn band(&self, name: &str) -> AnalysisResult<ArrayView2<'_, GridValue>> {
        let idx = self.band_index(name)?;
        Ok(self.data.index_axis(Axis(0), idx))
    }

    /// View of one band by position
    pub fn band_at(&self, index: usize) -> ArrayView2<'_, GridValue> {
        self.data.index_axis(Axis(0), index)
    }

    /// Fill `buf` with the band vector at a pixel (band order of the schema)
    pub fn feature_vector(&self, row: usize, col: usize, buf: &mut Vec<GridValue>) {
        buf.clear();
        for b in 0..self.bands.len() {
            buf.push(self.data[[b, row, col]]);
        }
    }

    /// Alignment precondition for per-pixel arithmetic
    pub fn ensure_aligned(&self, other: &Raster) -> AnalysisResult<()> {
        if self.grid.aligns_with(&other.grid) {
            Ok(())
        } else {
            Err(AnalysisError::GridMismatch(format!(
                "{}x{} (EPSG:{}) vs {}x{} (EPSG:{})",
                self.grid.rows,
                self.grid.cols,
                self.grid.epsg,
                other.grid.rows,
                other.grid.cols,
                other.grid.epsg
            )))
        }
    }
}

/// One time-stamped member of a raster collection, with its
/// cloud/quality metadata
#[derive(Debug, Clone)]
pub struct Scene {
    pub raster: Raster,
    pub timestamp: DateTime<Utc>,
    /// Fraction of the scene obscured by cloud, in [0, 1]
    pub cloud_fraction: f32,
}

/// An ordered sequence of time-stamped rasters sharing one band schema.
///
/// Ordering is by timestamp; the sequence is not guaranteed to be
/// temporally contiguous or gap-free.
#[derive(Debug, Clone)]
pub struct RasterCollection {
    scenes: Vec<Scene>,
    bands: Vec<String>,
}

impl RasterCollection {
    pub fn new(mut scenes: Vec<Scene>) -> AnalysisResult<Self> {
        let bands = match scenes.first() {
            Some(s) => s.raster.band_names().to_vec(),
            None => Vec::new(),
        };
        for scene in &scenes {
            if scene.raster.band_names() != bands.as_slice() {
                return Err(AnalysisError::InvalidInput(format!(
                    "collection band schema mismatch: {:?} vs {:?}",
                    scene.raster.band_names(),
                    bands
                )));
            }
        }
        scenes.sort_by_key(|s| s.timestamp);
        Ok(Self { scenes, bands })
    }

    pub fn empty() -> Self {
        Self { scenes: Vec::new(), bands: Vec::new() }
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn band_names(&self) -> &[String] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

/// A single raster reduced from a collection, carrying the source
/// timestamps it was built from for provenance
#[derive(Debug, Clone)]
pub struct Composite {
    raster: Raster,
    source_timestamps: Vec<DateTime<Utc>>,
}

impl Composite {
    pub fn new(raster: Raster, source_timestamps: Vec<DateTime<Utc>>) -> Self {
        Self { raster, source_timestamps }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn source_timestamps(&self) -> &[DateTime<Utc>] {
        &self.source_timestamps
    }

    /// True when no scene contributed (all cells are the no-data sentinel)
    pub fn is_no_data(&self) -> bool {
        self.source_timestamps.is_empty()
    }
}

/// Binary raster mask on the grid of its source raster.
///
/// Invariant: a set cell corresponds to an index value exceeding the
/// threshold it was derived with; no-data cells are never set.
#[derive(Debug, Clone)]
pub struct Mask {
    grid: RasterGrid,
    data: Array2<u8>,
}

impl Mask {
    pub fn new(grid: RasterGrid, data: Array2<u8>) -> AnalysisResult<Self> {
        let (rows, cols) = data.dim();
        if rows != grid.rows || cols != grid.cols {
            return Err(AnalysisError::InvalidInput(format!(
                "mask shape {}x{} does not match grid {}x{}",
                rows, cols, grid.rows, grid.cols
            )));
        }
        Ok(Self { grid, data })
    }

    pub fn grid(&self) -> &RasterGrid {
        &self.grid
    }

    pub fn data(&self) -> &Array2<u8> {
        &self.data
    }

    pub fn is_set(&self, row: usize, col: usize) -> bool {
        self.data[[row, col]] != 0
    }

    pub fn count_set(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// A polygon in world coordinates: one exterior ring plus optional holes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<(f64, f64)>,
    interiors: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self { exterior, interiors: Vec::new() }
    }

    pub fn with_interiors(exterior: Vec<(f64, f64)>, interiors: Vec<Vec<(f64, f64)>>) -> Self {
        Self { exterior, interiors }
    }

    /// Axis-aligned rectangle covering a bounding box
    pub fn from_bounding_box(bbox: &BoundingBox) -> Self {
        Self::new(vec![
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
            (bbox.min_x, bbox.max_y),
        ])
    }

    pub fn exterior(&self) -> &[(f64, f64)] {
        &self.exterior
    }

    pub fn interiors(&self) -> &[Vec<(f64, f64)>] {
        &self.interiors
    }

    /// Even-odd containment test over all rings; a point inside a hole
    /// is outside the polygon
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut crossings = 0usize;
        for ring in std::iter::once(&self.exterior).chain(self.interiors.iter()) {
            crossings += ray_crossings(ring, x, y);
        }
        crossings % 2 == 1
    }
}

fn ray_crossings(ring: &[(f64, f64)], x: f64, y: f64) -> usize {
    let n = ring.len();
    let mut crossings = 0usize;
    for i in 0..n {
        let (x1, y1) = ring[i];
        let (x2, y2) = ring[(i + 1) % n];
        if (y1 > y) != (y2 > y) {
            let x_cross = x1 + (y - y1) / (y2 - y1) * (x2 - x1);
            if x < x_cross {
                crossings += 1;
            }
        }
    }
    crossings
}

/// Aggregation period identifier. Unique and totally ordered within a
/// time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PeriodKey {
    /// Calendar month of a climatology (1..=12)
    Month(u32),
    /// Acquisition date of a per-scene series
    Date(NaiveDate),
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodKey::Month(m) => write!(f, "{:02}", m),
            PeriodKey::Date(d) => write!(f, "{}", d),
        }
    }
}

/// One entry of a zonal time series. `value` is NaN for a period with
/// no measurement, so consumers can distinguish "zero measured" from
/// "unmeasured".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeSeriesEntry {
    pub period: PeriodKey,
    pub value: GridValue,
}

/// A labeled training location in world coordinates; label is 0 or 1
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub x: f64,
    pub y: f64,
    pub label: u8,
}

/// One training sample: the band vector sampled at a point, paired with
/// the point's class label
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub features: Vec<GridValue>,
    pub label: u8,
}

/// Error types for watershed analysis
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Training error: {0}")]
    Training(String),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
