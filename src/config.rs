use std::{fs, num::NonZeroUsize, path::Path, path::PathBuf};

use serde::Deserialize;

use crate::{
    Result, TrainErr,
    arch::loss::WeightedEnergyForces,
    averaging::AnnealStrategy,
    graph::Padding,
};

/// How validation errors are summarized in the progress log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ErrorReporting {
    #[default]
    PerAtomRMSE,
    TotalRMSE,
    PerAtomMAE,
    TotalMAE,
}

/// The options of the training loop itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainConfig {
    #[serde(default)]
    pub start_epoch: usize,
    pub max_num_epochs: usize,
    pub eval_interval: NonZeroUsize,
    pub patience: NonZeroUsize,
    #[serde(default)]
    pub log_errors: ErrorReporting,
    /// Only reported, gradients are never clipped.
    #[serde(default)]
    pub max_grad_norm: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EmaConfig {
    pub decay: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SwaConfig {
    /// The first epoch of the SWA phase.
    pub start: usize,
    pub swa_lr: f32,
    #[serde(default = "default_anneal_epochs")]
    pub anneal_epochs: usize,
    #[serde(default)]
    pub anneal_strategy: AnnealStrategy,
    #[serde(default = "default_swa_energy_weight")]
    pub energy_weight: f32,
    #[serde(default = "default_swa_forces_weight")]
    pub forces_weight: f32,
}

fn default_anneal_epochs() -> usize {
    1
}

fn default_swa_energy_weight() -> f32 {
    1000.0
}

fn default_swa_forces_weight() -> f32 {
    100.0
}

impl SwaConfig {
    /// The loss used once the SWA phase starts.
    pub fn loss_fn(&self) -> WeightedEnergyForces {
        WeightedEnergyForces::new(self.energy_weight, self.forces_weight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    GradientDescent { lr: f32 },
    GradientDescentWithMomentum { lr: f32, momentum: f32 },
    Adam { lr: f32, b1: f32, b2: f32, eps: f32 },
}

impl OptimizerConfig {
    pub fn learning_rate(&self) -> f32 {
        match *self {
            OptimizerConfig::GradientDescent { lr }
            | OptimizerConfig::GradientDescentWithMomentum { lr, .. }
            | OptimizerConfig::Adam { lr, .. } => lr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub n_species: usize,
    /// The isolated atom energy of every species.
    pub atomic_energies: Vec<f32>,
    #[serde(default = "default_stiffness")]
    pub stiffness: f32,
}

fn default_stiffness() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataConfig {
    pub train_path: PathBuf,
    pub valid_path: PathBuf,
    pub batch_size: NonZeroUsize,
    /// Defaults to `batch_size`.
    #[serde(default)]
    pub valid_batch_size: Option<NonZeroUsize>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub drop_last: bool,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub padding: Padding,
}

/// Everything a training run is built from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Prefixes every file the run writes.
    pub name: String,
    pub output_dir: PathBuf,
    /// Resume from the newest checkpoint of `name`, if there's one.
    #[serde(default)]
    pub restart_latest: bool,
    /// Keep every checkpoint instead of only the newest one.
    #[serde(default)]
    pub keep_checkpoints: bool,
    pub model: ModelConfig,
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub loss: WeightedEnergyForces,
    pub data: DataConfig,
    pub train: TrainConfig,
    #[serde(default)]
    pub ema: Option<EmaConfig>,
    #[serde(default)]
    pub swa: Option<SwaConfig>,
}

fn invalid(msg: impl Into<String>) -> TrainErr {
    TrainErr::InvalidConfig(msg.into())
}

impl RunConfig {
    /// Reads and validates a JSON run configuration.
    ///
    /// # Arguments
    /// * `path` - The path to the JSON file.
    ///
    /// # Returns
    /// The configuration or an error if it can't be read, parsed or is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the constraints that the types alone don't enforce.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid("the run name can't be empty"));
        }

        if self.model.n_species == 0 {
            return Err(invalid("the model needs at least one species"));
        }

        if self.model.atomic_energies.len() != self.model.n_species {
            return Err(invalid(format!(
                "expected {} atomic energies, got {}",
                self.model.n_species,
                self.model.atomic_energies.len()
            )));
        }

        if self.optimizer.learning_rate() <= 0.0 {
            return Err(invalid("the learning rate must be positive"));
        }

        check_loss_weights("loss", self.loss.energy_weight, self.loss.forces_weight)?;

        if let Some(ema) = self.ema
            && !(0.0..=1.0).contains(&ema.decay)
        {
            return Err(invalid(format!("ema decay {} is not in [0, 1]", ema.decay)));
        }

        if let Some(swa) = self.swa {
            if swa.swa_lr <= 0.0 {
                return Err(invalid("the swa learning rate must be positive"));
            }

            check_loss_weights("swa loss", swa.energy_weight, swa.forces_weight)?;
        }

        if let Some(norm) = self.train.max_grad_norm
            && norm <= 0.0
        {
            return Err(invalid("max_grad_norm must be positive"));
        }

        Ok(())
    }
}

fn check_loss_weights(what: &str, energy_weight: f32, forces_weight: f32) -> Result<()> {
    if energy_weight < 0.0 || forces_weight < 0.0 {
        return Err(invalid(format!("{what} weights can't be negative")));
    }

    Ok(())
}
