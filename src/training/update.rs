use std::collections::HashMap;

use log::debug;
use ndarray::Zip;

use super::TrainState;
use crate::{
    Result,
    arch::{
        Model, Prediction,
        loss::{LossFn, masked_mean},
    },
    graph::{BatchShape, GraphBatch},
    optimization::GradientTransform,
};

/// One optimization step over a padded batch.
///
/// The step is specialized per batch shape: the first batch of every new
/// `(n_graph, n_node)` signature allocates the workspace that the following
/// batches of that signature reuse.
#[derive(Debug, Default)]
pub struct UpdateStep {
    workspaces: HashMap<BatchShape, Prediction>,
}

impl UpdateStep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the amount of distinct batch shapes seen so far.
    pub fn specializations(&self) -> usize {
        self.workspaces.len()
    }

    /// Makes a single update.
    ///
    /// Computes the mean loss over the real graphs of `graph`, pulls its gradient
    /// back to the parameters, applies the transform's updates and, if enabled,
    /// folds the new parameters into the moving average.
    ///
    /// # Arguments
    /// * `model` - The model being trained.
    /// * `loss_fn` - The loss to minimize.
    /// * `transform` - Turns gradients into updates.
    /// * `state` - The state before the update, consumed.
    /// * `graph` - The padded batch.
    ///
    /// # Returns
    /// The loss before the update and the new state, or an error if a collaborator fails.
    pub fn step<M, L, T>(
        &mut self,
        model: &M,
        loss_fn: &L,
        transform: &T,
        state: TrainState<T::State>,
        graph: &GraphBatch,
    ) -> Result<(f32, TrainState<T::State>)>
    where
        M: Model,
        L: LossFn,
        T: GradientTransform,
    {
        let TrainState {
            params,
            opt_state,
            ema,
            num_updates,
        } = state;
        let num_updates = num_updates + 1;

        let pred = model.forward(&params, graph)?;
        let loss = masked_mean(loss_fn.per_graph(graph, &pred).view(), graph.graph_mask.view());

        let shape = graph.shape();
        let cotangent = self.workspaces.entry(shape).or_insert_with(|| {
            debug!(n_graph = shape.n_graph, n_node = shape.n_node; "specializing update step");
            Prediction::zeros(shape)
        });

        let grad = loss_fn.per_graph_grad(graph, &pred);
        let scale = 1. / graph.num_real_graphs() as f32;

        Zip::from(&mut cotangent.energy)
            .and(&grad.energy)
            .and(&graph.graph_mask)
            .for_each(|c, &g, &real| *c = if real { g * scale } else { 0. });

        Zip::from(cotangent.forces.rows_mut())
            .and(grad.forces.rows())
            .and(&graph.node_graph)
            .for_each(|mut c, g, &owner| {
                if graph.graph_mask[owner] {
                    c.zip_mut_with(&g, |c, &g| *c = g * scale);
                } else {
                    c.fill(0.);
                }
            });

        let grad = model.vjp(&params, graph, cotangent)?;
        let (updates, opt_state) = transform.update(&grad, opt_state, &params)?;
        let params = params.apply_updates(&updates)?;

        let ema = ema
            .map(|ema| ema.update(&params, num_updates))
            .transpose()?;

        let state = TrainState {
            params,
            opt_state,
            ema,
            num_updates,
        };

        Ok((loss, state))
    }
}
