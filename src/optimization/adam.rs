use serde::{Deserialize, Serialize};

use super::GradientTransform;
use crate::{Result, params::Params};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub count: u32,
    pub mu: Params,
    pub nu: Params,
}

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        }
    }
}

impl GradientTransform for Adam {
    type State = AdamState;

    fn init(&self, params: &Params) -> AdamState {
        AdamState {
            count: 0,
            mu: params.zeros_like(),
            nu: params.zeros_like(),
        }
    }

    fn update(
        &self,
        grad: &Params,
        state: AdamState,
        _params: &Params,
    ) -> Result<(Params, AdamState)> {
        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
        } = *self;

        let mu = state
            .mu
            .zip_with(grad, "adam first moment", |m, g| b1 * m + (1. - b1) * g)?;
        let nu = state
            .nu
            .zip_with(grad, "adam second moment", |v, g| b2 * v + (1. - b2) * g * g)?;
        let count = state.count + 1;

        let bc1 = 1. - b1.powi(count as i32);
        let bc2 = 1. - b2.powi(count as i32);
        let step_size = lr * (bc2.sqrt() / bc1);

        let updates = mu.zip_with(&nu, "adam update", |m, v| {
            -step_size * m / (v.sqrt() + eps)
        })?;

        Ok((updates, AdamState { count, mu, nu }))
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}
