mod evaluate;
mod trainer;
mod update;

pub use evaluate::evaluate;
pub use trainer::{Phase, StopReason, TrainOutcome, Trainer, summary};
pub use update::UpdateStep;

use crate::{averaging::Ema, optimization::GradientTransform, params::Params};

/// The values threaded through every update of a run.
#[derive(Debug, Clone)]
pub struct TrainState<S> {
    pub params: Params,
    pub opt_state: S,
    /// The moving average of `params`, if enabled.
    pub ema: Option<Ema>,
    /// The amount of updates made so far.
    pub num_updates: u64,
}

impl<S> TrainState<S> {
    /// Creates the state of a fresh run.
    ///
    /// # Arguments
    /// * `params` - The initial parameters.
    /// * `transform` - The transform that will update them.
    ///
    /// # Returns
    /// A new `TrainState` with the transform's initial state and no moving average.
    pub fn new<T>(params: Params, transform: &T) -> Self
    where
        T: GradientTransform<State = S>,
    {
        let opt_state = transform.init(&params);

        Self {
            params,
            opt_state,
            ema: None,
            num_updates: 0,
        }
    }

    /// Resumes from previously saved parameters and optimizer state.
    pub fn resume(params: Params, opt_state: S) -> Self {
        Self {
            params,
            opt_state,
            ema: None,
            num_updates: 0,
        }
    }

    /// Enables the moving average, starting from the current parameters.
    pub fn with_ema(mut self, decay: f32) -> Self {
        self.ema = Some(Ema::new(&self.params, decay));
        self
    }

    /// Returns the parameters to evaluate and save: the moving average if enabled,
    /// the live parameters otherwise.
    pub fn eval_params(&self) -> &Params {
        self.ema.as_ref().map_or(&self.params, Ema::params)
    }
}
