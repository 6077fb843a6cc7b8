use ndarray::{Array1, Axis, Zip};
use serde::Deserialize;

use super::LossFn;
use crate::{arch::Prediction, graph::GraphBatch};

/// Weighted sum of the per-atom energy error and the force error of a graph.
///
/// For a graph with `n` atoms:
/// `energy_weight * ((E - Ê) / n)^2 + forces_weight * sum_i |F_i - F̂_i|^2 / (3n)`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WeightedEnergyForces {
    pub energy_weight: f32,
    pub forces_weight: f32,
}

impl WeightedEnergyForces {
    /// Returns a new `WeightedEnergyForces`.
    pub fn new(energy_weight: f32, forces_weight: f32) -> Self {
        Self {
            energy_weight,
            forces_weight,
        }
    }
}

impl Default for WeightedEnergyForces {
    fn default() -> Self {
        Self::new(1.0, 100.0)
    }
}

/// Atom counts as floats, with empty graphs counted as one atom.
fn atom_counts(graph: &GraphBatch) -> Array1<f32> {
    graph.n_node.mapv(|n| n.max(1) as f32)
}

impl LossFn for WeightedEnergyForces {
    fn per_graph(&self, graph: &GraphBatch, pred: &Prediction) -> Array1<f32> {
        let n = atom_counts(graph);

        let de = (&graph.energy - &pred.energy) / &n;
        let energy_term = de.mapv(|x| x * x) * self.energy_weight;

        let df = &graph.forces - &pred.forces;
        let node_sq = df.mapv(|x| x * x).sum_axis(Axis(1));
        let forces_term = graph.sum_per_graph(&node_sq) / (3.0 * &n) * self.forces_weight;

        energy_term + forces_term
    }

    fn per_graph_grad(&self, graph: &GraphBatch, pred: &Prediction) -> Prediction {
        let n = atom_counts(graph);
        let we = self.energy_weight;
        let wf = self.forces_weight;

        let mut energy = &pred.energy - &graph.energy;
        Zip::from(&mut energy)
            .and(&n)
            .for_each(|e, &n| *e *= 2.0 * we / (n * n));

        let mut forces = &pred.forces - &graph.forces;
        Zip::from(forces.rows_mut())
            .and(&graph.node_graph)
            .for_each(|mut f, &g| f *= 2.0 * wf / (3.0 * n[g]));

        Prediction { energy, forces }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Configuration, RawBatch, pad_with_graphs};

    fn graph() -> GraphBatch {
        let configs = [
            Configuration {
                positions: vec![[0.0; 3]; 2],
                species: vec![0, 0],
                energy: 4.0,
                forces: vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            },
            Configuration {
                positions: vec![[0.0; 3]],
                species: vec![0],
                energy: -1.0,
                forces: vec![[0.0, 0.0, 3.0]],
            },
        ];
        let raw = RawBatch::from_configurations(&configs).unwrap();
        pad_with_graphs(&raw, 4, 3).unwrap()
    }

    #[test]
    fn per_graph_loss() {
        let graph = graph();
        let pred = Prediction::zeros(graph.shape());
        let loss = WeightedEnergyForces::new(1.0, 3.0).per_graph(&graph, &pred);

        // graph 0: (4 / 2)^2 + 3 * (1 + 1) / 6 = 5
        // graph 1: (-1 / 1)^2 + 3 * 9 / 3 = 10
        assert_eq!(loss.to_vec(), [5.0, 10.0, 0.0]);
    }

    #[test]
    fn grad_matches_finite_differences() {
        let graph = graph();
        let loss_fn = WeightedEnergyForces::new(2.0, 5.0);
        let mut pred = Prediction::zeros(graph.shape());
        pred.energy[0] = 1.0;
        pred.forces[[1, 1]] = 0.5;

        let grad = loss_fn.per_graph_grad(&graph, &pred);
        let total = |p: &Prediction| loss_fn.per_graph(&graph, p).sum();
        let eps = 1e-2;

        let mut up = pred.clone();
        let mut down = pred.clone();
        up.energy[0] += eps;
        down.energy[0] -= eps;
        let numeric = (total(&up) - total(&down)) / (2.0 * eps);
        assert!((numeric - grad.energy[0]).abs() < 1e-3);

        let mut up = pred.clone();
        let mut down = pred.clone();
        up.forces[[1, 1]] += eps;
        down.forces[[1, 1]] -= eps;
        let numeric = (total(&up) - total(&down)) / (2.0 * eps);
        assert!((numeric - grad.forces[[1, 1]]).abs() < 1e-3);
    }
}
