use super::GradientTransform;
use crate::{Result, params::Params};

#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
        }
    }
}

impl GradientTransform for GradientDescentWithMomentum {
    /// The velocity.
    type State = Params;

    fn init(&self, params: &Params) -> Params {
        params.zeros_like()
    }

    fn update(
        &self,
        grad: &Params,
        velocity: Params,
        _params: &Params,
    ) -> Result<(Params, Params)> {
        let lr = self.learning_rate;
        let mu = self.momentum;

        let velocity = velocity.zip_with(grad, "velocity", |v, g| mu * v + g)?;
        let updates = velocity.map(|v| -lr * v);

        Ok((updates, velocity))
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}
