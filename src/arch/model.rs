use ndarray::{Array1, Array2};

use crate::{
    Result,
    graph::{BatchShape, GraphBatch},
    params::Params,
};

/// The output of a model over a padded batch.
///
/// The same type doubles as the cotangent of the output when pulling a
/// gradient back through the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// One energy per graph.
    pub energy: Array1<f32>,
    /// One force vector per node.
    pub forces: Array2<f32>,
}

impl Prediction {
    /// Returns an all-zero prediction for batches of the given shape.
    pub fn zeros(shape: BatchShape) -> Self {
        Self {
            energy: Array1::zeros(shape.n_graph),
            forces: Array2::zeros((shape.n_node, 3)),
        }
    }

    #[inline]
    pub fn shape(&self) -> BatchShape {
        BatchShape {
            n_graph: self.energy.len(),
            n_node: self.forces.nrows(),
        }
    }
}

/// A differentiable energy model.
pub trait Model {
    /// Makes a forward pass over a padded batch.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `graph` - The padded batch.
    ///
    /// # Returns
    /// The predicted energies and forces, padding entries included.
    fn forward(&self, params: &Params, graph: &GraphBatch) -> Result<Prediction>;

    /// Pulls a cotangent of the output back to the parameters (a vector-Jacobian product).
    ///
    /// # Arguments
    /// * `params` - The parameters the forward pass was evaluated at.
    /// * `graph` - The padded batch.
    /// * `cotangent` - The derivative of a scalar with respect to every output entry.
    ///
    /// # Returns
    /// The derivative of that scalar with respect to every parameter, with the
    /// same structure as `params`.
    fn vjp(&self, params: &Params, graph: &GraphBatch, cotangent: &Prediction) -> Result<Params>;
}
