use std::path::PathBuf;

use log::info;
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Result, TrainErr,
    arch::HarmonicModel,
    averaging::{SwaContainer, SwaLr},
    checkpoint::DirCheckpointHandler,
    config::{OptimizerConfig, RunConfig},
    graph::{GraphLoader, InMemoryLoader, load_configurations},
    logger::JsonLinesLogger,
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, GradientTransform},
    params::Params,
    training::{StopReason, TrainState, Trainer},
};

/// What a finished run reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub stop_reason: StopReason,
    pub last_epoch: Option<usize>,
    pub lowest_loss: f64,
    pub num_updates: u64,
    /// The amount of snapshots folded into the SWA average.
    pub swa_averaged: usize,
    /// Where the SWA average was written, if any snapshot was averaged.
    pub swa_path: Option<PathBuf>,
}

/// Builds and runs a training pipeline from a `RunConfig`.
#[derive(Default)]
pub struct RunBuilder;

impl RunBuilder {
    /// Creates a new `RunBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds every collaborator described by `config` and trains until the run stops.
    ///
    /// # Arguments
    /// * `config` - A validated run configuration.
    ///
    /// # Returns
    /// The report of the run, or the first error raised while building or training.
    pub fn run(&self, config: &RunConfig) -> Result<RunReport> {
        let model = HarmonicModel::new(config.model.n_species);
        let params = model.init_params(&config.model.atomic_energies, config.model.stiffness)?;

        info!(
            n_species = config.model.n_species,
            num_params = params.num_params();
            "built model"
        );

        self.resolve_optimizer(config, model, params)
    }

    fn resolve_optimizer(
        &self,
        config: &RunConfig,
        model: HarmonicModel,
        params: Params,
    ) -> Result<RunReport> {
        match config.optimizer {
            OptimizerConfig::GradientDescent { lr } => {
                let transform = GradientDescent::new(lr);
                self.terminate_build(config, model, params, transform)
            }
            OptimizerConfig::GradientDescentWithMomentum { lr, momentum } => {
                let transform = GradientDescentWithMomentum::new(lr, momentum);
                self.terminate_build(config, model, params, transform)
            }
            OptimizerConfig::Adam { lr, b1, b2, eps } => {
                let transform = Adam::new(lr, b1, b2, eps);
                self.terminate_build(config, model, params, transform)
            }
        }
    }

    fn terminate_build<T>(
        &self,
        config: &RunConfig,
        model: HarmonicModel,
        params: Params,
        transform: T,
    ) -> Result<RunReport>
    where
        T: GradientTransform,
    {
        let data = &config.data;
        let train_set = load_configurations(&data.train_path)?;
        let valid_set = load_configurations(&data.valid_path)?;

        info!(
            train = train_set.len(),
            valid = valid_set.len();
            "loaded datasets"
        );

        let mut train_loader =
            InMemoryLoader::new(train_set, data.batch_size).drop_last(data.drop_last);
        if data.shuffle {
            train_loader = train_loader.shuffled(self.generate_rng(data.seed));
        }

        if train_loader.is_empty() {
            return Err(TrainErr::EmptyDataset);
        }

        let valid_batch_size = data.valid_batch_size.unwrap_or(data.batch_size);
        let mut valid_loader = InMemoryLoader::new(valid_set, valid_batch_size);

        let mut checkpoints = DirCheckpointHandler::new(
            config.output_dir.join("checkpoints"),
            &config.name,
            config.keep_checkpoints,
        );

        let mut train_config = config.train.clone();
        let latest = if config.restart_latest {
            checkpoints.load_latest::<T::State>()?
        } else {
            None
        };

        let mut state = match latest {
            Some(checkpoint) => {
                info!(epoch = checkpoint.epoch; "restarting from checkpoint");
                train_config.start_epoch = checkpoint.epoch + 1;
                TrainState::resume(checkpoint.params, checkpoint.optimizer_state)
            }
            None => TrainState::new(params, &transform),
        };

        if let Some(ema) = config.ema {
            state = state.with_ema(ema.decay);
        }

        let swa = config.swa.map(|swa| {
            let scheduler = SwaLr::new(
                &transform,
                swa.swa_lr,
                swa.anneal_epochs,
                swa.anneal_strategy,
            );
            SwaContainer::new(scheduler, swa.start, swa.loss_fn())
        });

        let mut trainer =
            Trainer::new(model, config.loss, transform, train_config).with_padding(data.padding);
        if let Some(swa) = swa {
            trainer = trainer.with_swa(swa);
        }

        let mut logger = JsonLinesLogger::to_file(&config.output_dir, &config.name)?;
        let outcome = trainer.train(
            state,
            &mut train_loader,
            &mut valid_loader,
            &mut checkpoints,
            &mut logger,
        )?;

        let averaged = trainer.swa().map(|swa| &swa.averaged);
        let swa_path = match averaged.and_then(|a| a.params()) {
            Some(params) => Some(checkpoints.save_averaged(params)?),
            None => None,
        };

        Ok(RunReport {
            stop_reason: outcome.stop_reason,
            last_epoch: outcome.last_epoch,
            lowest_loss: outcome.lowest_loss,
            num_updates: outcome.state.num_updates,
            swa_averaged: averaged.map_or(0, |a| a.n_averaged()),
            swa_path,
        })
    }

    fn generate_rng(&self, seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }
}
