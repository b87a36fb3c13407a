//! Mask vectorization
//!
//! Converts a binary mask into one polygon per maximal connected
//! component. Components are found by flood fill under a configurable
//! connectivity rule (8-connected by default); each component boundary
//! is traced along pixel edges and emitted in world coordinates.
//!
//! Output is deterministic for a given mask: components are discovered
//! in row-major order and boundary walks start from the lexicographically
//! first boundary edge of each component.

use crate::types::{GeoTransform, Mask, Polygon};
use ndarray::Array2;
use std::collections::{HashMap, VecDeque};

/// Pixel connectivity rule for component labeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// Edge-adjacent neighbors only
    Four,
    /// Edge- and corner-adjacent neighbors
    #[default]
    Eight,
}

/// Mask-to-polygon processor
#[derive(Debug, Clone, Default)]
pub struct Vectorizer {
    connectivity: Connectivity,
}

impl Vectorizer {
    pub fn new(connectivity: Connectivity) -> Self {
        Self { connectivity }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Label connected components of set pixels.
    ///
    /// Returns the label grid (0 = background, labels start at 1 and are
    /// assigned in row-major discovery order) and the component count.
    pub fn label_components(&self, mask: &Mask) -> (Array2<u32>, usize) {
        let (rows, cols) = (mask.grid().rows, mask.grid().cols);
        let mut labels = Array2::<u32>::zeros((rows, cols));
        let mut next_label = 0u32;

        let offsets: &[(i64, i64)] = match self.connectivity {
            Connectivity::Four => &[(-1, 0), (1, 0), (0, -1), (0, 1)],
            Connectivity::Eight => &[
                (-1, -1),
                (-1, 0),
                (-1, 1),
                (0, -1),
                (0, 1),
                (1, -1),
                (1, 0),
                (1, 1),
            ],
        };

        let mut queue = VecDeque::new();
        for row in 0..rows {
            for col in 0..cols {
                if !mask.is_set(row, col) || labels[[row, col]] != 0 {
                    continue;
                }
                next_label += 1;
                labels[[row, col]] = next_label;
                queue.push_back((row, col));

                while let Some((r, c)) = queue.pop_front() {
                    for &(dr, dc) in offsets {
                        let nr = r as i64 + dr;
                        let nc = c as i64 + dc;
                        if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                            continue;
                        }
                        let (nr, nc) = (nr as usize, nc as usize);
                        if mask.is_set(nr, nc) && labels[[nr, nc]] == 0 {
                            labels[[nr, nc]] = next_label;
                            queue.push_back((nr, nc));
                        }
                    }
                }
            }
        }

        (labels, next_label as usize)
    }

    /// Convert a mask into a polygon set, one polygon per connected
    /// component.
    ///
    /// An empty mask yields an empty set; a fully set mask yields one
    /// polygon bounding the whole grid. The largest ring of a component
    /// is its exterior; remaining rings are holes.
    pub fn vectorize(&self, mask: &Mask) -> Vec<Polygon> {
        let (labels, count) = self.label_components(mask);
        log::info!(
            "Vectorizing mask: {} set pixels, {} components ({:?}-connectivity)",
            mask.count_set(),
            count,
            self.connectivity
        );
        if count == 0 {
            return Vec::new();
        }

        let transform = &mask.grid().transform;
        let mut polygons = Vec::with_capacity(count);
        for label in 1..=count as u32 {
            let rings = trace_component(&labels, label);
            if let Some(polygon) = rings_to_polygon(rings, transform) {
                polygons.push(polygon);
            }
        }
        polygons
    }
}

/// Directed boundary edge between two grid vertices, (x, y) = (col, row)
type Vertex = (i64, i64);

/// Collect the directed boundary edges of one component and chain them
/// into closed rings of grid vertices.
///
/// Edges are oriented with the component on the right of travel. At a
/// vertex with more than one continuation (a corner where diagonal
/// pixels of the component touch), the walk takes the turn away from
/// the component, which merges corner-touching rings into one.
fn trace_component(labels: &Array2<u32>, label: u32) -> Vec<Vec<Vertex>> {
    let (rows, cols) = labels.dim();
    let in_comp = |r: i64, c: i64| -> bool {
        r >= 0
            && c >= 0
            && r < rows as i64
            && c < cols as i64
            && labels[[r as usize, c as usize]] == label
    };

    // Directed edges, insertion order is row-major per pixel
    let mut edges: Vec<(Vertex, Vertex)> = Vec::new();
    for r in 0..rows as i64 {
        for c in 0..cols as i64 {
            if !in_comp(r, c) {
                continue;
            }
            if !in_comp(r - 1, c) {
                edges.push(((c, r), (c + 1, r))); // north wall, walking east
            }
            if !in_comp(r, c + 1) {
                edges.push(((c + 1, r), (c + 1, r + 1))); // east wall, south
            }
            if !in_comp(r + 1, c) {
                edges.push(((c + 1, r + 1), (c, r + 1))); // south wall, west
            }
            if !in_comp(r, c - 1) {
                edges.push(((c, r + 1), (c, r))); // west wall, north
            }
        }
    }

    let mut by_start: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, (start, _)) in edges.iter().enumerate() {
        by_start.entry(*start).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for first in 0..edges.len() {
        if used[first] {
            continue;
        }
        let mut ring: Vec<Vertex> = Vec::new();
        let mut current = first;
        loop {
            used[current] = true;
            let (start, end) = edges[current];
            let dir = (end.0 - start.0, end.1 - start.1);

            // Merge collinear runs as we go
            match ring.last() {
                Some(&prev) if (start.0 - prev.0, start.1 - prev.1) == dir => {}
                _ => ring.push(start),
            }

            if end == edges[first].0 {
                break;
            }

            // Pick the unused continuation turning hardest away from the
            // component interior (smallest cross product with `dir`)
            let next = by_start
                .get(&end)
                .into_iter()
                .flatten()
                .copied()
                .filter(|&i| !used[i])
                .min_by_key(|&i| {
                    let (s, e) = edges[i];
                    let nd = (e.0 - s.0, e.1 - s.1);
                    dir.0 * nd.1 - dir.1 * nd.0
                });
            match next {
                Some(i) => current = i,
                None => break, // walls exhausted; ring closes here
            }
        }
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }

    rings
}

/// Map rings of grid vertices into one world-coordinate polygon: the
/// ring with the largest enclosed area becomes the exterior, the rest
/// become holes.
fn rings_to_polygon(rings: Vec<Vec<Vertex>>, transform: &GeoTransform) -> Option<Polygon> {
    if rings.is_empty() {
        return None;
    }

    let area = |ring: &[Vertex]| -> f64 {
        let n = ring.len();
        let mut acc = 0.0;
        for i in 0..n {
            let (x1, y1) = ring[i];
            let (x2, y2) = ring[(i + 1) % n];
            acc += (x1 * y2 - x2 * y1) as f64;
        }
        acc.abs() / 2.0
    };

    let exterior_idx = rings
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| area(a).partial_cmp(&area(b)).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)?;

    let to_world = |ring: &[Vertex]| -> Vec<(f64, f64)> {
        ring.iter()
            .map(|&(x, y)| {
                let xf = x as f64;
                let yf = y as f64;
                (
                    transform.top_left_x + xf * transform.pixel_width + yf * transform.rotation_x,
                    transform.top_left_y + xf * transform.rotation_y + yf * transform.pixel_height,
                )
            })
            .collect()
    };

    let exterior = to_world(&rings[exterior_idx]);
    let interiors: Vec<Vec<(f64, f64)>> = rings
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != exterior_idx)
        .map(|(_, ring)| to_world(ring))
        .collect();

    Some(Polygon::with_interiors(exterior, interiors))
}
