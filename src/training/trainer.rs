use std::{collections::BTreeMap, time::Instant};

use log::info;

use super::{TrainState, UpdateStep, evaluate};
use crate::{
    Result,
    arch::{Model, loss::LossFn},
    averaging::SwaContainer,
    checkpoint::{CheckpointHandler, CheckpointState},
    config::{ErrorReporting, TrainConfig},
    graph::{GraphLoader, Padding},
    logger::{MetricsLogger, MetricsRecord, Mode},
    optimization::GradientTransform,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The validation loss stopped improving.
    Patience,
    EpochLimit,
}

/// Where a run is in its lifecycle.
///
/// `Training` turns into `SwaActive` at most once, and either one ends in `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    SwaActive,
    Stopped(StopReason),
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct TrainOutcome<S> {
    pub state: TrainState<S>,
    pub stop_reason: StopReason,
    /// Whether the SWA phase had started.
    pub swa_active: bool,
    /// The last epoch that ran, `None` if the run had no epochs.
    pub last_epoch: Option<usize>,
    pub lowest_loss: f64,
}

/// Drives the update step over the training data and evaluates every few epochs.
pub struct Trainer<M, L, T> {
    model: M,
    loss_fn: L,
    transform: T,
    config: TrainConfig,
    padding: Padding,
    swa: Option<SwaContainer<L>>,
    update: UpdateStep,
    phase: Phase,
}

fn active_loss<'a, L>(phase: Phase, loss_fn: &'a L, swa: Option<&'a SwaContainer<L>>) -> &'a L {
    match (phase, swa) {
        (Phase::SwaActive, Some(swa)) => &swa.loss_fn,
        _ => loss_fn,
    }
}

impl<M, L, T> Trainer<M, L, T>
where
    M: Model,
    L: LossFn,
    T: GradientTransform,
{
    /// Creates a new `Trainer`.
    ///
    /// # Arguments
    /// * `model` - The model to train.
    /// * `loss_fn` - The loss to minimize until the SWA phase, if any.
    /// * `transform` - Turns gradients into updates.
    /// * `config` - The options of the loop.
    ///
    /// # Returns
    /// A new `Trainer` instance.
    pub fn new(model: M, loss_fn: L, transform: T, config: TrainConfig) -> Self {
        Self {
            model,
            loss_fn,
            transform,
            config,
            padding: Padding::default(),
            swa: None,
            update: UpdateStep::new(),
            phase: Phase::Training,
        }
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    /// Enables stochastic weight averaging.
    pub fn with_swa(mut self, swa: SwaContainer<L>) -> Self {
        self.swa = Some(swa);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn swa(&self) -> Option<&SwaContainer<L>> {
        self.swa.as_ref()
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Runs the training loop.
    ///
    /// Every epoch makes one update per training batch. Every `eval_interval`
    /// epochs the validation loss is measured, with the moving average of the
    /// parameters when enabled, and a checkpoint is saved whenever it strictly
    /// improves. The run stops after `patience` evaluations without improvement
    /// or when the epochs run out.
    ///
    /// # Arguments
    /// * `state` - The state to start from.
    /// * `train_loader` - The training data.
    /// * `valid_loader` - The validation data.
    /// * `checkpoints` - Where improving states are saved.
    /// * `logger` - Where every `opt` and `eval` record goes.
    ///
    /// # Returns
    /// The outcome of the run, or the first error raised by a collaborator.
    pub fn train<D, V, C, G>(
        &mut self,
        mut state: TrainState<T::State>,
        train_loader: &mut D,
        valid_loader: &mut V,
        checkpoints: &mut C,
        logger: &mut G,
    ) -> Result<TrainOutcome<T::State>>
    where
        D: GraphLoader,
        V: GraphLoader,
        C: CheckpointHandler,
        G: MetricsLogger,
    {
        let mut lowest_loss = f64::INFINITY;
        let mut patience_counter = 0;
        let mut last_epoch = None;
        let mut stop_reason = StopReason::EpochLimit;
        self.phase = Phase::Training;

        if let Some(tolerance) = self.config.max_grad_norm {
            info!("Using gradient clipping with tolerance={tolerance:.3}");
        }

        info!("Started training");

        for epoch in self.config.start_epoch..self.config.max_num_epochs {
            last_epoch = Some(epoch);
            state = self.train_one_epoch(state, train_loader, logger, epoch)?;

            if epoch % self.config.eval_interval.get() == 0 {
                let loss_fn = active_loss(self.phase, &self.loss_fn, self.swa.as_ref());
                let (valid_loss, metrics) = evaluate(
                    &self.model,
                    state.eval_params(),
                    loss_fn,
                    valid_loader,
                    &self.padding,
                )?;

                info!(
                    "{}",
                    summary(self.config.log_errors, epoch, valid_loss, &metrics)
                );
                logger.log(&MetricsRecord::new(Mode::Eval, epoch, metrics))?;

                if valid_loss < lowest_loss {
                    lowest_loss = valid_loss;
                    patience_counter = 0;

                    let snapshot = CheckpointState::new(state.eval_params(), &state.opt_state);
                    checkpoints.save(&snapshot, epoch)?;
                } else {
                    patience_counter += 1;

                    if patience_counter >= self.config.patience.get() {
                        info!(
                            "Stopping optimization after {patience_counter} epochs without improvement"
                        );
                        stop_reason = StopReason::Patience;
                        break;
                    }
                }
            }

            if let Some(swa) = &mut self.swa
                && epoch >= swa.start
            {
                if self.phase == Phase::Training {
                    info!("Changing loss based on SWA");
                    self.phase = Phase::SwaActive;
                }

                swa.averaged = std::mem::take(&mut swa.averaged).update(&state.params)?;
                swa.scheduler.step(&mut self.transform);
            }
        }

        let swa_active = self.phase == Phase::SwaActive;
        self.phase = Phase::Stopped(stop_reason);
        info!(specializations = self.update.specializations(); "Training complete");

        Ok(TrainOutcome {
            state,
            stop_reason,
            swa_active,
            last_epoch,
            lowest_loss,
        })
    }

    fn train_one_epoch<D, G>(
        &mut self,
        mut state: TrainState<T::State>,
        loader: &mut D,
        logger: &mut G,
        epoch: usize,
    ) -> Result<TrainState<T::State>>
    where
        D: GraphLoader,
        G: MetricsLogger,
    {
        let loss_fn = active_loss(self.phase, &self.loss_fn, self.swa.as_ref());

        for batch in loader.batches() {
            let start = Instant::now();
            let graph = self.padding.pad(&batch?)?;

            let (loss, next) =
                self.update
                    .step(&self.model, loss_fn, &self.transform, state, &graph)?;
            state = next;

            let values = BTreeMap::from([
                ("loss".to_string(), loss as f64),
                ("time".to_string(), start.elapsed().as_secs_f64()),
            ]);
            logger.log(&MetricsRecord::new(Mode::Opt, epoch, values))?;
        }

        Ok(state)
    }
}

/// Formats the one line progress report of an evaluation, errors in meV.
///
/// # Arguments
/// * `reporting` - Which errors to report.
/// * `epoch` - The epoch of the evaluation.
/// * `valid_loss` - The average validation loss.
/// * `metrics` - The metrics returned by `evaluate`.
pub fn summary(
    reporting: ErrorReporting,
    epoch: usize,
    valid_loss: f64,
    metrics: &BTreeMap<String, f64>,
) -> String {
    let mev = |key: &str| metrics.get(key).copied().unwrap_or(f64::NAN) * 1e3;
    let head = format!("Epoch {epoch}: loss={valid_loss:.4}");

    match reporting {
        ErrorReporting::PerAtomRMSE => format!(
            "{head}, RMSE_E_per_atom={:.1} meV, RMSE_F={:.1} meV / A",
            mev("rmse_e_per_atom"),
            mev("rmse_f")
        ),
        ErrorReporting::TotalRMSE => format!(
            "{head}, RMSE_E={:.1} meV, RMSE_F={:.1} meV / A",
            mev("rmse_e"),
            mev("rmse_f")
        ),
        ErrorReporting::PerAtomMAE => format!(
            "{head}, MAE_E_per_atom={:.1} meV, MAE_F={:.1} meV / A",
            mev("mae_e_per_atom"),
            mev("mae_f")
        ),
        ErrorReporting::TotalMAE => format!(
            "{head}, MAE_E={:.1} meV, MAE_F={:.1} meV / A",
            mev("mae_e"),
            mev("mae_f")
        ),
    }
}
