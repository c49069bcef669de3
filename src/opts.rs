//! CLI options.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use crate::model::{LearningSchedule, Loss};
use crate::prelude::*;

pub mod parsers;

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Opts {
    /// Sentry DSN
    #[arg(short, long, env = "RATINGS_TRAINER_SENTRY_DSN")]
    pub sentry_dsn: Option<String>,

    /// Performance traces sample rate for Sentry
    #[arg(long, default_value = "0", env = "RATINGS_TRAINER_TRACES_SAMPLE_RATE")]
    pub traces_sample_rate: f32,

    #[command(subcommand)]
    pub subcommand: Command,
}

#[derive(Subcommand)]
pub enum Command {
    Train(TrainOpts),
    Evaluate(EvaluateOpts),
}

/// Trains the model and checkpoints it after every step
#[derive(Args)]
pub struct TrainOpts {
    /// Interaction matrix: JSON for `.json` files, otherwise a pickled mapping
    /// of `shape`, `indptr`, `indices` and `data` (not a pickled SciPy matrix)
    #[arg(long, default_value = "data/intersect-20m/ratings.csr")]
    pub data: PathBuf,

    /// Base directory for the session folders
    #[arg(long, default_value = "log")]
    pub log_dir: PathBuf,

    /// Total number of passes over the training partition
    #[arg(long, default_value = "50", value_parser = parsers::non_zero_usize)]
    pub epochs: usize,

    /// Number of passes per fitting step
    #[arg(long, default_value = "5", value_parser = parsers::non_zero_usize)]
    pub step: usize,

    /// Latent dimension
    #[arg(long, default_value = "32", value_parser = parsers::non_zero_usize)]
    pub num_components: usize,

    /// Ranking cutoff for the precision metric
    #[arg(short, long, default_value = "10", value_parser = parsers::non_zero_usize)]
    pub k: usize,

    /// L2 regularization strength for both user and item features
    #[arg(long, default_value = "0.003", value_parser = parsers::non_negative_f64)]
    pub alpha: f64,

    /// Initial learning rate (Adagrad only)
    #[arg(long, default_value = "0.05", value_parser = parsers::non_negative_f64)]
    pub learning_rate: f64,

    #[arg(long, value_enum, default_value = "adagrad")]
    pub learning_schedule: LearningSchedule,

    #[arg(long, value_enum, default_value = "warp")]
    pub loss: Loss,

    /// Maximum number of negative samples per positive interaction (WARP only)
    #[arg(long, default_value = "10", value_parser = parsers::non_zero_usize)]
    pub max_sampled: usize,

    /// Held-out share of the interactions
    #[arg(long, default_value = "0.2", value_parser = parsers::percentage)]
    pub test_percentage: f64,

    /// Partition to compute the precision on
    #[arg(long, value_enum, default_value = "train")]
    pub evaluate_on: Partition,

    /// Number of evaluation worker threads
    #[arg(long, default_value = "6", value_parser = parsers::non_zero_usize)]
    pub num_threads: usize,

    /// Random seed for the split and the model, random if omitted
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Evaluates a saved checkpoint against an interaction matrix
#[derive(Args)]
pub struct EvaluateOpts {
    /// Checkpoint file, for example `log/<session>/models/epoch_9`
    #[arg(long)]
    pub checkpoint: PathBuf,

    /// Interaction matrix: JSON for `.json` files, otherwise a pickled mapping
    /// of `shape`, `indptr`, `indices` and `data` (not a pickled SciPy matrix)
    #[arg(long)]
    pub data: PathBuf,

    /// Interactions to exclude from the ranking, usually the training partition
    #[arg(long)]
    pub exclude: Option<PathBuf>,

    /// Ranking cutoff for the precision metric
    #[arg(short, long, default_value = "10", value_parser = parsers::non_zero_usize)]
    pub k: usize,

    /// Number of evaluation worker threads
    #[arg(long, default_value = "6", value_parser = parsers::non_zero_usize)]
    pub num_threads: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Test,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_ok() {
        Opts::command().debug_assert();
    }

    #[test]
    fn train_defaults_ok() -> crate::Result {
        let opts = Opts::try_parse_from(["ratings-trainer", "train"])?;
        let Command::Train(opts) = opts.subcommand else {
            bail!("expected the train subcommand");
        };
        assert_eq!(opts.epochs, 50);
        assert_eq!(opts.step, 5);
        assert_eq!(opts.num_components, 32);
        assert_eq!(opts.k, 10);
        assert_eq!(opts.num_threads, 6);
        assert_eq!(opts.learning_schedule, LearningSchedule::Adagrad);
        assert_eq!(opts.loss, Loss::Warp);
        assert_eq!(opts.evaluate_on, Partition::Train);
        assert!((opts.alpha - 0.003).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn data_help_names_the_format() -> crate::Result {
        let command = Opts::command();
        let train = command
            .find_subcommand("train")
            .ok_or_else(|| anyhow!("no train subcommand"))?;
        let data = train
            .get_arguments()
            .find(|argument| argument.get_id() == "data")
            .ok_or_else(|| anyhow!("no data argument"))?;
        let help = data.get_help().map(ToString::to_string).unwrap_or_default();
        assert!(help.contains("`indptr`"), "{}", help);
        assert!(help.contains("SciPy"), "{}", help);
        Ok(())
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(Opts::try_parse_from(["ratings-trainer", "train", "--step", "0"]).is_err());
    }
}
