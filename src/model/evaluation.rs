use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::dataset::{Features, Interactions};
use crate::model::{FactorizationModel, Representation};
use crate::prelude::*;

/// Precision@k for every user that has at least one positive interaction in `test`.
///
/// An item is a hit when fewer than `k` candidates score strictly higher.
/// Items stored in `exclude` (typically the training partition) are not candidates.
/// The output follows the user order.
#[instrument(level = "debug", skip_all, fields(k = k, num_threads = num_threads))]
pub fn precision_at_k(
    model: &FactorizationModel,
    test: &Interactions,
    exclude: Option<&Interactions>,
    k: usize,
    user_features: &Features,
    item_features: &Features,
    num_threads: usize,
) -> Result<Vec<f64>> {
    ensure!(k != 0, "`k` must be positive");
    ensure!(
        test.n_rows() == user_features.n_rows() && test.n_columns() == item_features.n_rows(),
        "the {:?} interactions do not match {} user and {} item feature rows",
        test.shape,
        user_features.n_rows(),
        item_features.n_rows(),
    );
    if let Some(exclude) = exclude {
        ensure!(
            exclude.shape == test.shape,
            "the excluded interactions have shape {:?}, expected {:?}",
            exclude.shape,
            test.shape,
        );
    }
    let state = model.fitted_state(user_features, item_features)?;
    ensure!(state.is_finite(), "not all model parameters are finite");

    let items: Vec<Representation> = (0..item_features.n_rows())
        .map(|item| state.items.representation(item_features, item))
        .collect();
    let users = (0..test.n_rows())
        .filter(|user| test.positives(*user).next().is_some())
        .collect_vec();

    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .context("failed to build the evaluation thread pool")?;
    pool.install(|| {
        users
            .par_iter()
            .map(|user| -> Result<f64> {
                let representation = state.users.representation(user_features, *user);
                let excluded = exclude.map_or_else(Vec::new, |exclude| {
                    let mut columns = exclude.row(*user).map(|(column, _)| column).collect_vec();
                    columns.sort_unstable();
                    columns
                });
                let scores = (0..items.len())
                    .map(|item| representation.score(&items[item]))
                    .collect_vec();
                ensure!(
                    scores.iter().all(|score| score.is_finite()),
                    "non-finite scores for user #{}, the model may have diverged",
                    user,
                );
                let mut candidates = scores
                    .iter()
                    .enumerate()
                    .filter(|(item, _)| excluded.binary_search(item).is_err())
                    .map(|(_, score)| *score)
                    .collect_vec();
                candidates.sort_unstable_by(|lhs, rhs| rhs.total_cmp(lhs));
                let n_hits = test
                    .positives(*user)
                    .filter(|item| candidates.partition_point(|score| *score > scores[*item]) < k)
                    .count();
                Ok(n_hits as f64 / k as f64)
            })
            .collect()
    })
}
