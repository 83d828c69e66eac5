//! Random forest regression.
//!
//! Bagged CART regression trees: each tree is grown on a bootstrap sample,
//! considers every feature at every split, and splits until a node is pure
//! or smaller than `min_samples_split`. The ensemble prediction is the mean
//! of the trees. Every tree draws from its own `StdRng` seeded from the
//! forest seed, so a fixed seed gives bit-identical models.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::AppError;

/// Minimal capability a forecaster needs from a regression engine.
pub trait Regressor {
    /// Fit on a feature matrix (one row per sample) and its targets.
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), AppError>;

    /// Predict the target for one feature row.
    fn predict(&self, row: &[f64]) -> Result<f64, AppError>;

    /// Short name recorded alongside accuracy metrics.
    fn name(&self) -> &'static str;
}

/// Hyper-parameters shared by every forest built in one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub seed: u64,
    pub min_samples_split: usize,
    pub max_depth: Option<usize>,
}

impl ForestParams {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            n_trees,
            seed,
            min_samples_split: 2,
            max_depth: None,
        }
    }

    /// A fresh, unfitted forest.
    pub fn build(&self) -> RandomForestRegressor {
        RandomForestRegressor::new(*self)
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    cost: f64,
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    params: ForestParams,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(mut self, sample: Vec<usize>) -> Tree {
        self.build_node(sample, 0);
        Tree { nodes: self.nodes }
    }

    /// Append the subtree for `sample` and return its root index.
    fn build_node(&mut self, mut sample: Vec<usize>, depth: usize) -> usize {
        let idx = self.nodes.len();
        let mean = sample.iter().map(|&i| self.targets[i]).sum::<f64>() / sample.len() as f64;
        self.nodes.push(Node::Leaf(mean));

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if sample.len() < self.params.min_samples_split || depth_reached || self.is_pure(&sample) {
            return idx;
        }

        let Some(split) = self.best_split(&mut sample) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| self.features[i][split.feature] <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return idx;
        }

        let left_idx = self.build_node(left, depth + 1);
        let right_idx = self.build_node(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_idx,
            right: right_idx,
        };
        idx
    }

    fn is_pure(&self, sample: &[usize]) -> bool {
        let first = self.targets[sample[0]];
        sample.iter().all(|&i| self.targets[i] == first)
    }

    /// Lowest summed squared error split over all features.
    fn best_split(&self, sample: &mut [usize]) -> Option<BestSplit> {
        let n = sample.len();
        let n_features = self.features[sample[0]].len();
        let mut best: Option<BestSplit> = None;

        for feature in 0..n_features {
            sample.sort_by(|&a, &b| {
                self.features[a][feature].total_cmp(&self.features[b][feature])
            });

            let total_sum: f64 = sample.iter().map(|&i| self.targets[i]).sum();
            let total_sq: f64 = sample.iter().map(|&i| self.targets[i].powi(2)).sum();
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;

            for pos in 0..n - 1 {
                let y = self.targets[sample[pos]];
                left_sum += y;
                left_sq += y * y;

                let here = self.features[sample[pos]][feature];
                let next = self.features[sample[pos + 1]][feature];
                if here == next {
                    continue;
                }

                let left_n = (pos + 1) as f64;
                let right_n = (n - pos - 1) as f64;
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let cost = (left_sq - left_sum * left_sum / left_n)
                    + (right_sq - right_sum * right_sum / right_n);

                if best.as_ref().map_or(true, |b| cost < b.cost) {
                    // The midpoint of adjacent floats can round up to `next`.
                    let mut threshold = here + (next - here) / 2.0;
                    if threshold >= next {
                        threshold = here;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        cost,
                    });
                }
            }
        }

        best
    }
}

/// Ensemble of bootstrap-trained regression trees.
#[derive(Debug, Clone)]
pub struct RandomForestRegressor {
    params: ForestParams,
    trees: Vec<Tree>,
}

impl RandomForestRegressor {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl Regressor for RandomForestRegressor {
    fn fit(&mut self, features: &[Vec<f64>], targets: &[f64]) -> Result<(), AppError> {
        if features.is_empty() {
            return Err(AppError::Model("cannot fit on zero samples".to_string()));
        }
        if features.len() != targets.len() {
            return Err(AppError::Model(format!(
                "feature rows ({}) and targets ({}) differ in length",
                features.len(),
                targets.len()
            )));
        }
        let width = features[0].len();
        if width == 0 || features.iter().any(|row| row.len() != width) {
            return Err(AppError::Model(
                "feature rows must share a non-zero width".to_string(),
            ));
        }
        if self.params.n_trees == 0 {
            return Err(AppError::Model("forest needs at least one tree".to_string()));
        }

        let n = features.len();
        let mut seeder = StdRng::seed_from_u64(self.params.seed);
        self.trees = (0..self.params.n_trees)
            .map(|_| {
                let mut rng = StdRng::seed_from_u64(seeder.gen());
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                TreeBuilder {
                    features,
                    targets,
                    params: self.params,
                    nodes: Vec::new(),
                }
                .grow(sample)
            })
            .collect();

        tracing::debug!(
            "Fitted {} trees on {} samples x {} features",
            self.trees.len(),
            n,
            width
        );
        Ok(())
    }

    fn predict(&self, row: &[f64]) -> Result<f64, AppError> {
        if !self.is_fitted() {
            return Err(AppError::Model("predict called before fit".to_string()));
        }
        let total: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    fn name(&self) -> &'static str {
        "RandomForestRegressor"
    }
}
