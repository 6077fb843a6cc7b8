use ndarray::{Array1, ArrayView1};

use crate::{arch::Prediction, graph::GraphBatch};

/// A loss that scores every graph of a batch on its own.
pub trait LossFn {
    /// Computes the loss of every graph in the batch, padding graphs included.
    fn per_graph(&self, graph: &GraphBatch, pred: &Prediction) -> Array1<f32>;

    /// Computes the derivative of each graph's loss with respect to the prediction.
    ///
    /// The loss of a graph only depends on that graph's energy and on the forces of
    /// its own nodes, so all the derivatives fit in a single `Prediction`.
    fn per_graph_grad(&self, graph: &GraphBatch, pred: &Prediction) -> Prediction;

    /// Returns the mean loss over the real graphs of the batch.
    fn masked_mean(&self, graph: &GraphBatch, pred: &Prediction) -> f32 {
        masked_mean(self.per_graph(graph, pred).view(), graph.graph_mask.view())
    }
}

/// Averages the entries whose mask is set.
///
/// Masked out entries add nothing to the sum and are not counted. An all-false
/// mask yields `NaN`.
pub fn masked_mean(values: ArrayView1<f32>, mask: ArrayView1<bool>) -> f32 {
    let (sum, count) = values
        .iter()
        .zip(mask)
        .filter(|&(_, &m)| m)
        .fold((0.0, 0usize), |(sum, count), (&v, _)| (sum + v, count + 1));

    sum / count as f32
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn all_true_mask_is_plain_mean() {
        let values = arr1(&[1.0, 2.0, 6.0]);
        let mask = arr1(&[true, true, true]);

        assert_eq!(masked_mean(values.view(), mask.view()), values.mean().unwrap());
    }

    #[test]
    fn masked_entries_are_ignored() {
        let values = arr1(&[1.0, 3.0, f32::INFINITY, 100.0]);
        let mask = arr1(&[true, true, false, false]);

        assert_eq!(masked_mean(values.view(), mask.view()), 2.0);
    }

    #[test]
    fn empty_mask_is_nan() {
        let values = arr1(&[1.0]);
        let mask = arr1(&[false]);

        assert!(masked_mean(values.view(), mask.view()).is_nan());
    }
}
