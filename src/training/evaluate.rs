use std::{collections::BTreeMap, time::Instant};

use log::debug;

use crate::{
    Result,
    arch::{Model, loss::LossFn},
    graph::{GraphLoader, Padding},
    metrics::{mae, q95, rel_mae, rel_rmse, rmse},
    params::Params,
};

/// The per-example errors of a pass over a dataset.
#[derive(Debug, Default)]
struct Errors {
    energy: Vec<f32>,
    energy_per_atom: Vec<f32>,
    forces: Vec<f32>,
    ref_forces: Vec<f32>,
}

impl Errors {
    fn into_metrics(self, loss: f64) -> BTreeMap<String, f64> {
        let metrics = [
            ("loss", loss),
            ("mae_e", mae(&self.energy)),
            ("mae_e_per_atom", mae(&self.energy_per_atom)),
            ("mae_f", mae(&self.forces)),
            ("rel_mae_f", rel_mae(&self.forces, &self.ref_forces)),
            ("rmse_e", rmse(&self.energy)),
            ("rmse_e_per_atom", rmse(&self.energy_per_atom)),
            ("rmse_f", rmse(&self.forces)),
            ("rel_rmse_f", rel_rmse(&self.forces, &self.ref_forces)),
            ("q95_e", q95(&self.energy)),
            ("q95_f", q95(&self.forces)),
        ];

        metrics
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

/// Runs the model over every batch of `loader` and measures its errors.
///
/// The average loss is the plain mean of the per-batch losses, no matter how
/// many graphs each batch holds. An empty loader yields `NaN` everywhere.
///
/// # Arguments
/// * `model` - The model to evaluate.
/// * `params` - The parameters to evaluate it at.
/// * `loss_fn` - The loss to report.
/// * `loader` - The validation data.
/// * `padding` - How every batch is padded before the forward pass.
///
/// # Returns
/// The average loss and the metrics (`loss`, `mae_e`, `mae_e_per_atom`, `mae_f`,
/// `rel_mae_f`, `rmse_e`, `rmse_e_per_atom`, `rmse_f`, `rel_rmse_f`, `q95_e`,
/// `q95_f` and `time` in seconds).
pub fn evaluate<M, L, D>(
    model: &M,
    params: &Params,
    loss_fn: &L,
    loader: &mut D,
    padding: &Padding,
) -> Result<(f64, BTreeMap<String, f64>)>
where
    M: Model,
    L: LossFn,
    D: GraphLoader,
{
    let start = Instant::now();
    let mut errors = Errors::default();
    let mut total_loss = 0.0;
    let n_batches = loader.len();

    for batch in loader.batches() {
        let raw = batch?;
        let graph = padding.pad(&raw)?;
        let pred = model.forward(params, &graph)?;

        total_loss += loss_fn.masked_mean(&graph, &pred) as f64;

        let n_graphs = raw.num_graphs();
        let n_nodes = raw.num_nodes();

        for ((&target, &predicted), &atoms) in raw
            .energy
            .iter()
            .zip(&pred.energy)
            .zip(&raw.atoms_per_graph())
        {
            let delta = target - predicted;
            errors.energy.push(delta);
            errors.energy_per_atom.push(delta / atoms as f32);
        }

        for (target, predicted) in raw.forces.rows().into_iter().zip(pred.forces.rows()) {
            errors
                .forces
                .extend(target.iter().zip(predicted).map(|(t, p)| t - p));
            errors.ref_forces.extend(target.iter());
        }

        debug!(n_graphs = n_graphs, n_nodes = n_nodes; "evaluated batch");
    }

    let avg_loss = total_loss / n_batches as f64;
    let mut metrics = errors.into_metrics(avg_loss);
    metrics.insert("time".to_string(), start.elapsed().as_secs_f64());

    Ok((avg_loss, metrics))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::{
        arch::{HarmonicModel, loss::WeightedEnergyForces},
        graph::{Configuration, InMemoryLoader},
    };

    fn single_atom(energy: f32) -> Configuration {
        Configuration {
            positions: vec![[0.0; 3]],
            species: vec![0],
            energy,
            forces: vec![[0.0; 3]],
        }
    }

    fn run(configs: Vec<Configuration>, batch_size: usize) -> (f64, BTreeMap<String, f64>) {
        let model = HarmonicModel::new(1);
        let params = model.init_params(&[0.0], 0.0).unwrap();
        let mut loader = InMemoryLoader::new(configs, NonZeroUsize::new(batch_size).unwrap());

        evaluate(
            &model,
            &params,
            &WeightedEnergyForces::new(1.0, 0.0),
            &mut loader,
            &Padding::default(),
        )
        .unwrap()
    }

    #[test]
    fn two_batches_of_unit_errors() {
        let (loss, metrics) = run(vec![single_atom(1.0), single_atom(-1.0)], 1);

        assert_eq!(loss, 1.0);
        assert_eq!(metrics["loss"], 1.0);
        assert_eq!(metrics["mae_e"], 1.0);
        assert_eq!(metrics["rmse_e"], 1.0);
        assert_eq!(metrics["q95_e"], 1.0);
        assert_eq!(metrics["mae_e_per_atom"], 1.0);
        assert_eq!(metrics["mae_f"], 0.0);
        assert_eq!(metrics["rel_mae_f"], 0.0);
        assert!(metrics["time"] >= 0.0);
        assert_eq!(metrics.len(), 12);
    }

    #[test]
    fn average_loss_is_unweighted_by_batch_size() {
        // batches [1, 1] and [2] -> batch losses 1 and 4
        let (loss, metrics) = run(
            vec![single_atom(1.0), single_atom(1.0), single_atom(2.0)],
            2,
        );

        assert_eq!(loss, 2.5);
        assert_eq!(metrics["rmse_e"], 2f64.sqrt());
    }

    #[test]
    fn per_atom_errors_divide_by_graph_size() {
        let config = Configuration {
            positions: vec![[0.0; 3]; 4],
            species: vec![0; 4],
            energy: 2.0,
            forces: vec![[0.0; 3]; 4],
        };

        let (_, metrics) = run(vec![config], 1);

        assert_eq!(metrics["mae_e"], 2.0);
        assert_eq!(metrics["mae_e_per_atom"], 0.5);
    }

    #[test]
    fn force_errors_skip_padding_nodes() {
        let atom = |fx: f32| Configuration {
            forces: vec![[fx, 0.0, 0.0]],
            ..single_atom(0.0)
        };

        let model = HarmonicModel::new(1);
        let params = model.init_params(&[0.0], 0.0).unwrap();
        let mut loader =
            InMemoryLoader::new(vec![atom(1.0), atom(-3.0)], NonZeroUsize::new(1).unwrap());

        let (_, metrics) = evaluate(
            &model,
            &params,
            &WeightedEnergyForces::new(1.0, 1.0),
            &mut loader,
            &Padding::fixed(8, 4),
        )
        .unwrap();

        // deltas [1, 0, 0, -3, 0, 0], no padding row
        let close = |key: &str, expected: f64| {
            assert!(
                (metrics[key] - expected).abs() < 1e-5,
                "{key}: {} != {expected}",
                metrics[key]
            );
        };

        close("mae_f", 4.0 / 6.0);
        close("rmse_f", (10.0f64 / 6.0).sqrt());
        close("q95_f", 2.5);
        close("rel_mae_f", 100.0);
        close("rel_rmse_f", 100.0);
    }

    #[test]
    fn empty_loader_is_nan() {
        let (loss, metrics) = run(vec![], 1);

        assert!(loss.is_nan());
        assert!(metrics["mae_e"].is_nan());
        assert!(metrics["q95_f"].is_nan());
    }
}
