use super::GradientTransform;
use crate::{Result, params::Params};

/// Gradient descent optimization algorithm.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl GradientTransform for GradientDescent {
    type State = ();

    fn init(&self, _params: &Params) -> Self::State {}

    /// Makes a step in the opposite direction of the gradient, with a length of `learning_rate`.
    fn update(&self, grad: &Params, _state: (), params: &Params) -> Result<(Params, ())> {
        let lr = self.learning_rate;
        let updates = grad.zip_with(params, "gradient", |g, _| -lr * g)?;

        Ok((updates, ()))
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let params = Params::new().with("w", arr1(&[1.0, 2.0]));
        let grad = Params::new().with("w", arr1(&[0.5, -1.0]));
        let gd = GradientDescent::new(0.1);

        let (updates, ()) = gd.update(&grad, gd.init(&params), &params).unwrap();

        assert_eq!(updates, Params::new().with("w", arr1(&[-0.05, 0.1])));
    }

    #[test]
    fn mismatched_gradient_fails() {
        let params = Params::new().with("w", arr1(&[1.0, 2.0]));
        let grad = Params::new().with("v", arr1(&[0.5, -1.0]));
        let gd = GradientDescent::new(0.1);

        assert!(gd.update(&grad, (), &params).is_err());
    }
}
