use crate::dataset::{Features, Interactions};
use crate::helpers::average::Average;
use crate::model::{precision_at_k, FactorizationModel};
use crate::opts::EvaluateOpts;
use crate::prelude::*;
use crate::run_logger::load_checkpoint;

#[instrument(skip_all, fields(checkpoint = %opts.checkpoint.display()))]
pub fn run(opts: EvaluateOpts) -> Result {
    sentry::configure_scope(|scope| scope.set_tag("app", "evaluator"));

    let model: FactorizationModel = load_checkpoint(&opts.checkpoint)?;
    info!(params = ?model.params(), "loaded");
    let interactions = Interactions::load(&opts.data)?;
    let exclude = opts.exclude.as_deref().map(Interactions::load).transpose()?;

    let precision = evaluate(&model, &interactions, exclude.as_ref(), opts.k, opts.num_threads)?;
    info!(k = opts.k, precision, "evaluated");
    println!("Precision k{} : {}", opts.k, precision);
    Ok(())
}

/// Mean precision@k of the checkpointed model with identity features.
pub fn evaluate(
    model: &FactorizationModel,
    interactions: &Interactions,
    exclude: Option<&Interactions>,
    k: usize,
    num_threads: usize,
) -> Result<f64> {
    let user_features = Features::identity(interactions.n_rows());
    let item_features = Features::identity(interactions.n_columns());
    let precisions = precision_at_k(
        model,
        interactions,
        exclude,
        k,
        &user_features,
        &item_features,
        num_threads,
    )
    .context("the interactions do not match the checkpoint")?;
    Ok(precisions.into_iter().collect::<Average>().average())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelParams;
    use crate::run_logger::save_checkpoint;

    #[test]
    fn evaluate_checkpoint_ok() -> crate::Result {
        let directory = tempfile::tempdir()?;
        let path = directory.path().join("epoch_0");
        let interactions = Interactions::from_triplets(
            (3, 4),
            [(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0), (2, 3, 1.0)],
        )?;
        let features = (Features::identity(3), Features::identity(4));

        let mut model = FactorizationModel::new(ModelParams::default(), 5);
        model.fit_partial(&interactions, &features.0, &features.1, 2)?;
        save_checkpoint(&model, &path)?;

        let expected = evaluate(&model, &interactions, None, 2, 1)?;
        let restored: FactorizationModel = load_checkpoint(&path)?;
        let actual = evaluate(&restored, &interactions, None, 2, 1)?;
        assert_eq!(expected.to_bits(), actual.to_bits());
        assert!((0.0..=1.0).contains(&actual));
        Ok(())
    }

    #[test]
    fn evaluate_shape_mismatch() -> crate::Result {
        let interactions = Interactions::identity(3);
        let mut model = FactorizationModel::new(ModelParams::default(), 5);
        model.fit_partial(&interactions, &Features::identity(3), &Features::identity(3), 1)?;
        assert!(evaluate(&model, &Interactions::identity(4), None, 2, 1).is_err());
        Ok(())
    }
}
