use ndarray::{Array1, ArrayView1, Ix1, Zip};

use super::{Model, Prediction};
use crate::{Result, TrainErr, graph::GraphBatch, params::Params};

pub const ATOMIC_ENERGIES: &str = "readout/atomic_energies";
pub const STIFFNESS: &str = "interaction/stiffness";

/// A per-species harmonic well model.
///
/// Every atom `i` of species `s` contributes `e0[s] + k[s] * |r_i|^2 / 2` to the
/// energy of its graph, so its force is `-k[s] * r_i`.
#[derive(Debug, Clone, Copy)]
pub struct HarmonicModel {
    n_species: usize,
}

impl HarmonicModel {
    /// Creates a new `HarmonicModel`.
    ///
    /// # Arguments
    /// * `n_species` - The amount of distinct species.
    ///
    /// # Returns
    /// A new `HarmonicModel` instance.
    pub fn new(n_species: usize) -> Self {
        Self { n_species }
    }

    /// Builds the initial parameters.
    ///
    /// # Arguments
    /// * `atomic_energies` - The isolated atom energy of every species.
    /// * `stiffness` - The initial stiffness shared by every species.
    ///
    /// # Returns
    /// The parameters or a `SizeMismatch` if there's not one energy per species.
    pub fn init_params(&self, atomic_energies: &[f32], stiffness: f32) -> Result<Params> {
        if atomic_energies.len() != self.n_species {
            return Err(TrainErr::SizeMismatch {
                what: "atomic energies",
                got: atomic_energies.len(),
                expected: self.n_species,
            });
        }

        let params = Params::new()
            .with(ATOMIC_ENERGIES, Array1::from(atomic_energies.to_vec()))
            .with(STIFFNESS, Array1::from_elem(self.n_species, stiffness));

        Ok(params)
    }

    fn view_params<'a>(
        &self,
        params: &'a Params,
    ) -> Result<(ArrayView1<'a, f32>, ArrayView1<'a, f32>)> {
        let e0 = params
            .require(ATOMIC_ENERGIES)?
            .view()
            .into_dimensionality::<Ix1>()?;
        let k = params.require(STIFFNESS)?.view().into_dimensionality::<Ix1>()?;

        for (what, p) in [("atomic energies", &e0), ("stiffness", &k)] {
            if p.len() != self.n_species {
                return Err(TrainErr::SizeMismatch {
                    what,
                    got: p.len(),
                    expected: self.n_species,
                });
            }
        }

        Ok((e0, k))
    }

    fn check_species(&self, graph: &GraphBatch) -> Result<()> {
        match graph.species.iter().find(|&&s| s >= self.n_species) {
            Some(&s) => Err(TrainErr::SizeMismatch {
                what: "species index",
                got: s,
                expected: self.n_species,
            }),
            None => Ok(()),
        }
    }
}

impl Model for HarmonicModel {
    fn forward(&self, params: &Params, graph: &GraphBatch) -> Result<Prediction> {
        let (e0, k) = self.view_params(params)?;
        self.check_species(graph)?;

        let mut node_energy = Array1::zeros(graph.species.len());
        let mut forces = graph.positions.clone();

        Zip::from(&mut node_energy)
            .and(forces.rows_mut())
            .and(&graph.species)
            .for_each(|e, mut f, &s| {
                let r2 = f.dot(&f);
                *e = e0[s] + 0.5 * k[s] * r2;
                f *= -k[s];
            });

        Ok(Prediction {
            energy: graph.sum_per_graph(&node_energy),
            forces,
        })
    }

    fn vjp(&self, params: &Params, graph: &GraphBatch, cotangent: &Prediction) -> Result<Params> {
        self.view_params(params)?;
        self.check_species(graph)?;

        if cotangent.shape() != graph.shape() {
            return Err(TrainErr::SizeMismatch {
                what: "cotangent nodes",
                got: cotangent.forces.nrows(),
                expected: graph.species.len(),
            });
        }

        let mut d_e0 = Array1::<f32>::zeros(self.n_species);
        let mut d_k = Array1::<f32>::zeros(self.n_species);

        Zip::from(graph.positions.rows())
            .and(cotangent.forces.rows())
            .and(&graph.species)
            .and(&graph.node_graph)
            .for_each(|r, c_f, &s, &g| {
                let c_e = cotangent.energy[g];
                d_e0[s] += c_e;
                d_k[s] += c_e * 0.5 * r.dot(&r) - c_f.dot(&r);
            });

        Ok(Params::new().with(ATOMIC_ENERGIES, d_e0).with(STIFFNESS, d_k))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;
    use crate::graph::{Configuration, RawBatch, pad_with_graphs};

    fn graph() -> GraphBatch {
        let configs = [
            Configuration {
                positions: vec![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0]],
                species: vec![0, 1],
                energy: 0.0,
                forces: vec![[0.0; 3]; 2],
            },
            Configuration {
                positions: vec![[0.0, 0.0, 3.0]],
                species: vec![1],
                energy: 0.0,
                forces: vec![[0.0; 3]],
            },
        ];
        let raw = RawBatch::from_configurations(&configs).unwrap();
        pad_with_graphs(&raw, 4, 3).unwrap()
    }

    #[test]
    fn forward_sums_atomic_contributions() {
        let model = HarmonicModel::new(2);
        let params = Params::new()
            .with(ATOMIC_ENERGIES, arr1(&[-1.0, -2.0]))
            .with(STIFFNESS, arr1(&[2.0, 1.0]));

        let pred = model.forward(&params, &graph()).unwrap();

        // graph 0: (-1 + 0.5 * 2 * 1) + (-2 + 0.5 * 1 * 4) = 0
        // graph 1: -2 + 0.5 * 1 * 9 = 2.5
        // padding graph: one padding atom of species 0 at the origin
        assert_eq!(pred.energy.to_vec(), [0.0, 2.5, -1.0]);
        assert_eq!(pred.forces.row(0).to_vec(), [-2.0, 0.0, 0.0]);
        assert_eq!(pred.forces.row(2).to_vec(), [0.0, 0.0, -3.0]);
    }

    #[test]
    fn vjp_matches_finite_differences() {
        let model = HarmonicModel::new(2);
        let graph = graph();
        let params = model.init_params(&[-1.0, -2.0], 1.5).unwrap();

        let mut cotangent = Prediction::zeros(graph.shape());
        cotangent.energy.assign(&arr1(&[0.3, -0.7, 0.0]));
        cotangent.forces[[0, 0]] = 0.2;
        cotangent.forces[[2, 2]] = -0.4;

        let objective = |p: &Params| {
            let pred = model.forward(p, &graph).unwrap();
            (&pred.energy * &cotangent.energy).sum() + (&pred.forces * &cotangent.forces).sum()
        };

        let grad = model.vjp(&params, &graph, &cotangent).unwrap();
        let eps = 1e-2;

        for path in [ATOMIC_ENERGIES, STIFFNESS] {
            for s in 0..2 {
                let bump = |delta: f32| {
                    params
                        .iter()
                        .map(|(k, t)| {
                            let mut t = t.clone();
                            if k == path {
                                t.as_slice_mut().unwrap()[s] += delta;
                            }
                            (k.to_string(), t)
                        })
                        .collect::<Params>()
                };

                let numeric = (objective(&bump(eps)) - objective(&bump(-eps))) / (2.0 * eps);
                let analytic = grad.get(path).unwrap().as_slice().unwrap()[s];
                assert!(
                    (numeric - analytic).abs() < 1e-3,
                    "{path}[{s}]: numeric {numeric}, analytic {analytic}"
                );
            }
        }
    }

    #[test]
    fn unknown_species_fail() {
        let model = HarmonicModel::new(1);
        let params = model.init_params(&[0.0], 1.0).unwrap();

        assert!(model.forward(&params, &graph()).is_err());
    }
}
