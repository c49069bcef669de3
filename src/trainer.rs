//! Incremental fit → evaluate → checkpoint loop.

use serde::Serialize;

use crate::dataset::{Features, Interactions};
use crate::helpers::average::Average;
use crate::helpers::tracing::{format_duration, format_elapsed};
use crate::model::{precision_at_k, FactorizationModel, ModelParams};
use crate::opts::{Partition, TrainOpts};
use crate::prelude::*;
use crate::run_logger::{save_checkpoint, RunLogger};
use crate::session::Session;

/// Immutable run configuration.
#[derive(Serialize, Clone, Debug)]
pub struct TrainConfig {
    pub data: PathBuf,
    pub log_dir: PathBuf,

    /// Total number of passes.
    pub epochs: usize,

    /// Passes per fitting step.
    pub step: usize,

    pub k: usize,
    pub test_percentage: f64,
    pub evaluate_on: Partition,
    pub num_threads: usize,
    pub seed: u64,

    #[serde(flatten)]
    pub model: ModelParams,
}

impl From<TrainOpts> for TrainConfig {
    fn from(opts: TrainOpts) -> Self {
        Self {
            data: opts.data,
            log_dir: opts.log_dir,
            epochs: opts.epochs,
            step: opts.step,
            k: opts.k,
            test_percentage: opts.test_percentage,
            evaluate_on: opts.evaluate_on,
            num_threads: opts.num_threads,
            seed: opts.seed.unwrap_or_else(|| fastrand::u64(..)),
            model: ModelParams {
                no_components: opts.num_components,
                loss: opts.loss,
                learning_schedule: opts.learning_schedule,
                learning_rate: opts.learning_rate,
                user_alpha: opts.alpha,
                item_alpha: opts.alpha,
                max_sampled: opts.max_sampled,
                ..Default::default()
            },
        }
    }
}

impl TrainConfig {
    /// Number of passes for each fitting step. The last step takes the remainder.
    pub fn step_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.epochs)
            .step_by(self.step.max(1))
            .map(|start| self.step.min(self.epochs - start))
    }
}

/// Train/test partitions with identity features.
pub struct Dataset {
    pub train: Interactions,
    pub test: Interactions,
    pub user_features: Features,
    pub item_features: Features,
}

impl Dataset {
    pub fn split(
        interactions: &Interactions,
        config: &TrainConfig,
        rng: &mut fastrand::Rng,
    ) -> Result<Self> {
        let (train, test) = interactions.random_train_test_split(config.test_percentage, rng)?;
        Ok(Self {
            user_features: Features::identity(train.n_rows()),
            item_features: Features::identity(train.n_columns()),
            train,
            test,
        })
    }
}

#[instrument(skip_all)]
pub fn run(opts: TrainOpts) -> Result {
    sentry::configure_scope(|scope| scope.set_tag("app", "trainer"));

    let config = TrainConfig::from(opts);
    let interactions = Interactions::load(&config.data)?;
    let mut rng = fastrand::Rng::with_seed(config.seed);
    let dataset = Dataset::split(&interactions, &config, &mut rng)?;
    let model = FactorizationModel::new(config.model, rng.u64(..));

    let session = Session::create_now(&config.log_dir).report();
    let logger = RunLogger::new(&session.log_path);
    info!(session = session.id.as_str(), log_path = %logger.path().display(), "starting");

    train(&config, &session, &logger, &dataset, model)?;
    info!(session = session.id.as_str(), "finished");
    Ok(())
}

/// Logs the configuration, then fits, evaluates and checkpoints the model step by step.
/// Returns the final model.
#[instrument(level = "info", skip_all, fields(session = session.id.as_str()))]
pub fn train(
    config: &TrainConfig,
    session: &Session,
    logger: &RunLogger,
    dataset: &Dataset,
    mut model: FactorizationModel,
) -> Result<FactorizationModel> {
    logger.append_line(&serde_json::to_string(config)?)?;

    let n_steps = config.step_sizes().count();
    let mut n_passes = 0;
    for (step, step_size) in config.step_sizes().enumerate() {
        let start_instant = Instant::now();

        model.fit_partial(
            &dataset.train,
            &dataset.user_features,
            &dataset.item_features,
            step_size,
        )?;
        n_passes += step_size;
        let fit_elapsed = start_instant.elapsed();

        let precision = evaluate(config, dataset, &model)?;
        logger.append_line(&format!("Precision k{} : {}", config.k, precision))?;
        save_checkpoint(&model, &session.checkpoint_path(step))?;

        info!(
            step = step + 1,
            n_steps,
            n_passes,
            precision,
            fit = format_duration(fit_elapsed).as_str(),
            elapsed = format_elapsed(start_instant).as_str(),
        );
    }

    Ok(model)
}

fn evaluate(config: &TrainConfig, dataset: &Dataset, model: &FactorizationModel) -> Result<f64> {
    let (interactions, exclude) = match config.evaluate_on {
        Partition::Train => (&dataset.train, None),
        Partition::Test => (&dataset.test, Some(&dataset.train)),
    };
    let precisions = precision_at_k(
        model,
        interactions,
        exclude,
        config.k,
        &dataset.user_features,
        &dataset.item_features,
        config.num_threads,
    )?;
    if precisions.is_empty() {
        warn!(partition = ?config.evaluate_on, "no users with positive interactions to evaluate");
    }
    Ok(precisions.into_iter().collect::<Average>().average())
}
