use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Clips the WARP weight.
const MAX_WARP_WEIGHT: f64 = 10.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Loss {
    /// Weighted approximate-rank pairwise loss.
    Warp,

    /// Bayesian personalised ranking.
    Bpr,
}

/// WARP weight for a violating negative found after `n_sampled` draws.
#[must_use]
pub fn warp_weight(n_items: usize, n_sampled: usize) -> f64 {
    let approximate_rank = (n_items.saturating_sub(1) / n_sampled.max(1)).max(1);
    (approximate_rank as f64).ln().min(MAX_WARP_WEIGHT)
}

/// BPR weight: gradient of `-ln σ(positive - negative)` with respect to the difference.
#[must_use]
pub fn bpr_weight(positive_score: f64, negative_score: f64) -> f64 {
    sigmoid(negative_score - positive_score)
}

#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
