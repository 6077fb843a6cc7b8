use std::{env, process};

use anyhow::Context;
use log::info;

use mace_trainer::{config::RunConfig, runner::RunBuilder};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: mace-trainer <config.json>");
        process::exit(1);
    };

    let config = RunConfig::load(&path).with_context(|| format!("failed to load {path}"))?;
    info!(name = config.name.as_str(); "starting run");

    let report = RunBuilder::new()
        .run(&config)
        .with_context(|| format!("run {} failed", config.name))?;

    info!(
        lowest_loss = report.lowest_loss,
        num_updates = report.num_updates;
        "run finished at epoch {:?} ({:?})",
        report.last_epoch,
        report.stop_reason
    );

    Ok(())
}
