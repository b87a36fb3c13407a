//! Supervised hazard classification
//!
//! Extracts band vectors at labeled point locations, trains a random
//! forest by bootstrap aggregation with per-node feature subsampling,
//! and applies the model pixel-wise to a multi-band raster. The same
//! mechanics serve both hazard problems (rockfall susceptibility and
//! glacial-lake outburst risk); only the injected training point sets
//! differ.
//!
//! All randomness is derived from the explicit seed in
//! [`RandomForestParams`], so training is reproducible even with the
//! parallel tree fit.

use crate::types::{
    AnalysisError, AnalysisResult, GridValue, LabeledPoint, Raster, TrainingSample, NO_DATA,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Random forest construction parameters
#[derive(Debug, Clone)]
pub struct RandomForestParams {
    /// Number of trees in the ensemble
    pub tree_count: usize,
    /// Maximum tree depth; None grows until purity
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Features considered per split; None uses sqrt of the feature count
    pub max_features: Option<usize>,
    /// Seed for bootstrap and feature subsampling
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            tree_count: 50,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
            seed: 42,
        }
    }
}

/// Hazard classification processor
pub struct HazardClassifier {
    params: RandomForestParams,
}

/// One node of a fitted decision tree
#[derive(Debug, Clone)]
enum DecisionNode {
    Leaf {
        label: u8,
    },
    Split {
        feature: usize,
        threshold: GridValue,
        left: Box<DecisionNode>,
        right: Box<DecisionNode>,
    },
}

#[derive(Debug, Clone)]
struct DecisionTree {
    root: DecisionNode,
}

/// A trained ensemble. Immutable after training; consumed only through
/// prediction.
#[derive(Debug, Clone)]
pub struct RandomForestModel {
    trees: Vec<DecisionTree>,
    feature_count: usize,
}

impl RandomForestModel {
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Majority vote across the ensemble; ties break to the lowest label
    pub fn predict(&self, features: &[GridValue]) -> u8 {
        let mut votes = [0usize; 2];
        for tree in &self.trees {
            votes[tree.predict(features) as usize] += 1;
        }
        u8::from(votes[1] > votes[0])
    }
}

impl HazardClassifier {
    pub fn new(params: RandomForestParams) -> Self {
        Self { params }
    }

    /// Sample the raster at each labeled point (nearest pixel, not
    /// interpolated).
    ///
    /// Points outside the raster extent, and points over no-data
    /// pixels, are dropped with a warning rather than failing the run.
    pub fn extract_features(&self, raster: &Raster, points: &[LabeledPoint]) -> Vec<TrainingSample> {
        let mut samples = Vec::with_capacity(points.len());
        let mut buf = Vec::with_capacity(raster.band_count());
        for point in points {
            match raster.grid().locate(point.x, point.y) {
                Some((row, col)) => {
                    raster.feature_vector(row, col, &mut buf);
                    if buf.iter().any(|v| !v.is_finite()) {
                        log::warn!(
                            "Dropping training point ({}, {}): no-data pixel",
                            point.x,
                            point.y
                        );
                        continue;
                    }
                    samples.push(TrainingSample {
                        features: buf.clone(),
                        label: point.label,
                    });
                }
                None => {
                    log::warn!(
                        "Dropping training point ({}, {}): outside raster extent",
                        point.x,
                        point.y
                    );
                }
            }
        }
        log::info!(
            "Extracted {} training samples from {} points",
            samples.len(),
            points.len()
        );
        samples
    }

    /// Fit a random forest by bootstrap aggregation.
    ///
    /// A degenerate training set (fewer than 2 samples, a single-class
    /// label set, or inconsistent feature vectors) is fatal and is
    /// reported before any classification is attempted.
    pub fn train(&self, samples: &[TrainingSample]) -> AnalysisResult<RandomForestModel> {
        if samples.len() < 2 {
            return Err(AnalysisError::Training(format!(
                "need at least 2 training samples, got {}",
                samples.len()
            )));
        }
        let feature_count = samples[0].features.len();
        if feature_count == 0 {
            return Err(AnalysisError::Training("empty feature vectors".to_string()));
        }
        for sample in samples {
            if sample.features.len() != feature_count {
                return Err(AnalysisError::Training(format!(
                    "inconsistent feature vector length: {} vs {}",
                    sample.features.len(),
                    feature_count
                )));
            }
            if sample.label > 1 {
                return Err(AnalysisError::Training(format!(
                    "label {} outside the binary label set",
                    sample.label
                )));
            }
        }
        let first = samples[0].label;
        if samples.iter().all(|s| s.label == first) {
            return Err(AnalysisError::Training(format!(
                "single-class training set (all labels are {})",
                first
            )));
        }
        if self.params.tree_count == 0 {
            return Err(AnalysisError::Training("tree count must be positive".to_string()));
        }

        let mtry = self
            .params
            .max_features
            .unwrap_or_else(|| (feature_count as f64).sqrt().round() as usize)
            .clamp(1, feature_count);

        log::info!(
            "Training random forest: {} trees, {} samples, {} features (mtry {}), seed {}",
            self.params.tree_count,
            samples.len(),
            feature_count,
            mtry,
            self.params.seed
        );

        // One rng per tree, derived from the base seed, so the parallel
        // fit stays deterministic
        let fit_tree = |tree_index: usize| -> DecisionTree {
            let mut rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(tree_index as u64));
            let n = samples.len();
            let bootstrap: Vec<&TrainingSample> =
                (0..n).map(|_| &samples[rng.gen_range(0..n)]).collect();
            DecisionTree::fit(&bootstrap, &self.params, mtry, &mut rng)
        };

        #[cfg(feature = "parallel")]
        let trees: Vec<DecisionTree> = (0..self.params.tree_count)
            .into_par_iter()
            .map(fit_tree)
            .collect();

        #[cfg(not(feature = "parallel"))]
        let trees: Vec<DecisionTree> = (0..self.params.tree_count).map(fit_tree).collect();

        Ok(RandomForestModel { trees, feature_count })
    }

    /// Apply a trained model pixel-wise.
    ///
    /// Returns a single-band raster of label values on the input grid;
    /// pixels with any non-finite band value are no-data.
    pub fn classify(&self, model: &RandomForestModel, raster: &Raster) -> AnalysisResult<Raster> {
        if raster.band_count() != model.feature_count {
            return Err(AnalysisError::InvalidInput(format!(
                "raster has {} bands but the model expects {} features",
                raster.band_count(),
                model.feature_count
            )));
        }

        let (rows, cols) = (raster.grid().rows, raster.grid().cols);
        log::info!(
            "Classifying {}x{} raster with a {}-tree forest",
            rows,
            cols,
            model.tree_count()
        );

        let classify_row = |row: usize| -> Vec<GridValue> {
            let mut row_data = vec![NO_DATA; cols];
            let mut features = Vec::with_capacity(model.feature_count);
            for (col, out) in row_data.iter_mut().enumerate() {
                raster.feature_vector(row, col, &mut features);
                if features.iter().any(|v| !v.is_finite()) {
                    continue;
                }
                *out = model.predict(&features) as GridValue;
            }
            row_data
        };

        #[cfg(feature = "parallel")]
        let data: Vec<GridValue> = (0..rows).into_par_iter().flat_map(classify_row).collect();

        #[cfg(not(feature = "parallel"))]
        let data: Vec<GridValue> = (0..rows).flat_map(classify_row).collect();

        let image = Array2::from_shape_vec((rows, cols), data).map_err(|e| {
            AnalysisError::Processing(format!("failed to shape classification: {}", e))
        })?;
        Raster::single_band(raster.grid().clone(), "class", image)
    }
}

impl Default for HazardClassifier {
    fn default() -> Self {
        Self::new(RandomForestParams::default())
    }
}

impl DecisionTree {
    fn fit(
        samples: &[&TrainingSample],
        params: &RandomForestParams,
        mtry: usize,
        rng: &mut StdRng,
    ) -> Self {
        let root = build_node(samples, params, mtry, rng, 0);
        Self { root }
    }

    fn predict(&self, features: &[GridValue]) -> u8 {
        let mut node = &self.root;
        loop {
            match node {
                DecisionNode::Leaf { label } => return *label,
                DecisionNode::Split { feature, threshold, left, right } => {
                    node = if features[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

fn build_node(
    samples: &[&TrainingSample],
    params: &RandomForestParams,
    mtry: usize,
    rng: &mut StdRng,
    depth: usize,
) -> DecisionNode {
    let at_max_depth = params.max_depth.map(|d| depth >= d).unwrap_or(false);
    if at_max_depth
        || samples.len() < params.min_samples_split
        || samples.iter().all(|s| s.label == samples[0].label)
    {
        return DecisionNode::Leaf { label: majority_label(samples) };
    }

    match find_best_split(samples, mtry, rng) {
        Some((feature, threshold)) => {
            let (left, right): (Vec<&TrainingSample>, Vec<&TrainingSample>) = samples
                .iter()
                .copied()
                .partition(|s| s.features[feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                return DecisionNode::Leaf { label: majority_label(samples) };
            }
            DecisionNode::Split {
                feature,
                threshold,
                left: Box::new(build_node(&left, params, mtry, rng, depth + 1)),
                right: Box::new(build_node(&right, params, mtry, rng, depth + 1)),
            }
        }
        None => DecisionNode::Leaf { label: majority_label(samples) },
    }
}

/// Best Gini-gain split over a random feature subset
fn find_best_split(
    samples: &[&TrainingSample],
    mtry: usize,
    rng: &mut StdRng,
) -> Option<(usize, GridValue)> {
    let feature_count = samples[0].features.len();
    let mut feature_indices: Vec<usize> = (0..feature_count).collect();
    feature_indices.shuffle(rng);
    feature_indices.truncate(mtry.min(feature_count));

    let parent_gini = gini(samples.iter().map(|s| s.label));
    let total = samples.len() as f64;

    let mut best_gain = 0.0;
    let mut best: Option<(usize, GridValue)> = None;

    for &feature in &feature_indices {
        let mut thresholds: Vec<GridValue> =
            samples.iter().map(|s| s.features[feature]).collect();
        thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        thresholds.dedup();

        for &threshold in &thresholds {
            let left = samples.iter().filter(|s| s.features[feature] <= threshold);
            let right = samples.iter().filter(|s| s.features[feature] > threshold);
            let n_left = left.clone().count();
            let n_right = samples.len() - n_left;
            if n_left == 0 || n_right == 0 {
                continue;
            }

            let gain = parent_gini
                - (n_left as f64 / total) * gini(left.map(|s| s.label))
                - (n_right as f64 / total) * gini(right.map(|s| s.label));
            if gain > best_gain {
                best_gain = gain;
                best = Some((feature, threshold));
            }
        }
    }
    best
}

fn gini(labels: impl Iterator<Item = u8>) -> f64 {
    let mut counts = [0usize; 2];
    let mut total = 0usize;
    for label in labels {
        counts[label as usize] += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let mut impurity = 1.0;
    for count in counts {
        let p = count as f64 / total as f64;
        impurity -= p * p;
    }
    impurity
}

/// Majority label of a sample set; ties break to the lowest label
fn majority_label(samples: &[&TrainingSample]) -> u8 {
    let mut counts = [0usize; 2];
    for sample in samples {
        counts[sample.label as usize] += 1;
    }
    u8::from(counts[1] > counts[0])
}
