use serde::{Serialize, de::DeserializeOwned};

use crate::{Result, params::Params};

/// A stateless description of how gradients become parameter updates.
///
/// The optimizer state is owned by the caller and threaded through every call,
/// `update` consumes the previous state and returns the next one.
pub trait GradientTransform {
    type State: Clone + Serialize + DeserializeOwned;

    /// Creates the initial state for the given parameters.
    fn init(&self, params: &Params) -> Self::State;

    /// Transforms a gradient into the updates to add to the parameters.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the loss with respect to `params`.
    /// * `state` - The state returned by the previous call (or `init`).
    /// * `params` - The current parameters.
    ///
    /// # Returns
    /// The updates and the new state, or an error if the trees don't line up.
    fn update(
        &self,
        grad: &Params,
        state: Self::State,
        params: &Params,
    ) -> Result<(Params, Self::State)>;

    fn learning_rate(&self) -> f32;

    /// Overrides the learning rate used by the following updates.
    fn set_learning_rate(&mut self, learning_rate: f32);
}
