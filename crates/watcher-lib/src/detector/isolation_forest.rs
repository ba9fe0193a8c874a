//! Isolation forest outlier scorer
//!
//! Outliers are isolated by fewer random axis-aligned splits than inliers.
//! Each tree is grown on a random subsample; the raw score of a point is
//! `-2^(-E[h(x)] / c(psi))` where `h` is the path length to its leaf and
//! `c(psi)` the expected path length for a subsample of size `psi`.
//! The decision offset is the contamination quantile of the training
//! scores, so roughly that fraction of the training batch scores negative.

use super::model::{ModelConfig, ModelError, OutlierScorer};
use crate::models::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single isolation tree stored as a flat node arena
#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(
        data: &[FeatureVector],
        indices: &[usize],
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow_node(data, indices, 0, max_depth, rng);
        tree
    }

    fn grow_node(
        &mut self,
        data: &[FeatureVector],
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            size: indices.len(),
        });

        if depth >= max_depth || indices.len() <= 1 {
            return id;
        }

        // Only features that still vary inside this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..FEATURE_COUNT)
            .filter_map(|feature| {
                let (lo, hi) = indices.iter().map(|&i| data[i].get(feature)).fold(
                    (f64::INFINITY, f64::NEG_INFINITY),
                    |(lo, hi), v| (lo.min(v), hi.max(v)),
                );
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            return id;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let mut threshold = lo + rng.gen::<f64>() * (hi - lo);
        if threshold >= hi {
            threshold = lo;
        }

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| data[i].get(feature) <= threshold);

        let left = self.grow_node(data, &left_indices, depth + 1, max_depth, rng);
        let right = self.grow_node(data, &right_indices, depth + 1, max_depth, rng);

        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    fn path_length(&self, sample: &FeatureVector) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;

        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample.get(feature) <= threshold {
                        left
                    } else {
                        right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Ensemble of isolation trees with a contamination-derived offset
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
    offset: f64,
}

impl IsolationForest {
    /// Raw anomaly score in `[-1, 0)`; lower is more anomalous
    pub fn score_sample(&self, sample: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return -0.5;
        }

        let mean_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(sample))
            .sum::<f64>()
            / self.trees.len() as f64;
        let normalizer = average_path_length(self.subsample_size).max(1.0);

        -(2f64).powf(-mean_depth / normalizer)
    }

    /// Threshold subtracted from raw scores
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn subsample_size(&self) -> usize {
        self.subsample_size
    }
}

impl OutlierScorer for IsolationForest {
    fn fit(samples: &[FeatureVector], config: &ModelConfig) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        config.validate()?;

        let n = samples.len();
        let subsample_size = config.max_samples.min(n);
        let max_depth = (subsample_size.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let trees = (0..config.n_estimators)
            .map(|_| {
                let indices = rand::seq::index::sample(&mut rng, n, subsample_size).into_vec();
                IsolationTree::grow(samples, &indices, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            subsample_size,
            offset: 0.0,
        };

        let training_scores: Vec<f64> = samples.iter().map(|s| forest.score_sample(s)).collect();
        forest.offset = quantile(training_scores, config.contamination);

        Ok(forest)
    }

    fn decision(&self, sample: &FeatureVector) -> f64 {
        self.score_sample(sample) - self.offset
    }

    fn name(&self) -> &'static str {
        "isolation_forest"
    }
}

/// Expected path length of an unsuccessful search in a binary search tree
/// built from `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Quantile with linear interpolation between closest ranks
fn quantile(mut values: Vec<f64>, q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let rank = q.clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    values[lo] + (values[hi] - values[lo]) * frac
}
