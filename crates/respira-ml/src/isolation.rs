//! Isolation forest.
//!
//! Each tree recursively splits a random sub-sample on a random feature at a
//! uniformly random threshold between the node's min and max. Anomalies are
//! isolated in fewer splits, so a short average path length means anomalous.
//!
//! ```text
//! s(x)       = −2^(−E[h(x)] / c(ψ))            (score_samples, in [−1, 0))
//! offset     = contamination-quantile of s over the training set
//! decision   = s(x) − offset                    (< 0 ⇒ outlier)
//! ```
//!
//! `c(n)` is the average path length of an unsuccessful BST search over `n`
//! points and `ψ = min(256, n_samples)`.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use respira_contracts::error::{RespiraError, RespiraResult};

const MAX_SUBSAMPLE: usize = 256;
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful search in a BST of `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::grow_node(data, rows, 0, max_depth, rng),
        }
    }

    fn grow_node(data: &[Vec<f64>], rows: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        // Only features that vary within this node can split it.
        let dims = data[rows[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..dims)
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][f]), hi.max(data[r][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) = rows.into_iter().partition(|&r| data[r][feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Self::grow_node(data, left, depth + 1, max_depth, rng)),
            right: Box::new(Self::grow_node(data, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Hyper-parameters of an `IsolationForest`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub trees: usize,
    /// Expected share of outliers in the training data, in `(0, 0.5]`.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            contamination: 0.01,
            seed: 42,
        }
    }
}

/// A fitted isolation forest. Immutable after `fit`.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    dims: usize,
    subsample: usize,
    offset: f64,
}

impl IsolationForest {
    /// Fit on `data` (one row per sample, equal widths).
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty or ragged data, or out-of-range parameters.
    pub fn fit(data: &[Vec<f64>], params: ForestParams) -> RespiraResult<Self> {
        let dims = data.first().map(Vec::len).unwrap_or(0);
        if dims == 0 || data.iter().any(|row| row.len() != dims) {
            return Err(RespiraError::InvalidInput {
                reason: "isolation forest needs non-empty rows of equal width".to_string(),
            });
        }
        if params.trees == 0 || !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(RespiraError::InvalidInput {
                reason: format!(
                    "invalid forest parameters: trees={}, contamination={}",
                    params.trees, params.contamination
                ),
            });
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let subsample = data.len().min(MAX_SUBSAMPLE);
        let max_depth = (subsample as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..params.trees)
            .map(|_| {
                let rows = index::sample(&mut rng, data.len(), subsample).into_vec();
                IsolationTree::grow(data, rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            dims,
            subsample,
            offset: 0.0,
        };

        let mut scores: Vec<f64> = data.iter().map(|row| forest.score_samples(row)).collect();
        scores.sort_by(f64::total_cmp);
        forest.offset = quantile(&scores, params.contamination);
        Ok(forest)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// `−2^(−E[h(x)]/c(ψ))`; lower is more anomalous.
    pub fn score_samples(&self, x: &[f64]) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        -(2f64.powf(-mean_path / average_path_length(self.subsample)))
    }

    /// Shifted score; negative values are outliers.
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.score_samples(x) - self.offset
    }

    pub fn is_outlier(&self, x: &[f64]) -> bool {
        self.decision_function(x) < 0.0
    }
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
