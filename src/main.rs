#![warn(clippy::all, clippy::explicit_into_iter_loop, clippy::map_unwrap_or)]

use clap::Parser;

use crate::opts::{Command, Opts};
use crate::prelude::*;

mod dataset;
mod evaluator;
mod helpers;
mod model;
mod opts;
mod prelude;
mod run_logger;
mod session;
mod trainer;

fn main() -> Result {
    let opts = Opts::parse();
    let _sentry_guard = helpers::tracing::init(opts.sentry_dsn, opts.traces_sample_rate)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting up…");

    let result = match opts.subcommand {
        Command::Train(opts) => trainer::run(opts),
        Command::Evaluate(opts) => evaluator::run(opts),
    };
    if let Err(error) = &result {
        sentry::integrations::anyhow::capture_anyhow(error);
        tracing::error!("fatal error: {:#}", error);
    }
    result
}
