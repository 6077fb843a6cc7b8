#![allow(dead_code)]

use std::num::NonZeroUsize;

use ndarray::{Array1, arr1};
use serde::Serialize;

use mace_trainer::{
    Result,
    arch::{Model, Prediction, loss::LossFn},
    checkpoint::{CheckpointHandler, CheckpointState},
    config::{ErrorReporting, TrainConfig},
    graph::{Configuration, GraphBatch, InMemoryLoader},
    optimization::GradientTransform,
    params::Params,
    training::{TrainState, Trainer},
};

/// Predicts the scalar parameter `w` as the energy of every graph.
pub struct ScalarModel;

impl Model for ScalarModel {
    fn forward(&self, params: &Params, graph: &GraphBatch) -> Result<Prediction> {
        let w = params.require("w")?.sum();
        let mut pred = Prediction::zeros(graph.shape());
        pred.energy.fill(w);
        Ok(pred)
    }

    fn vjp(&self, _params: &Params, _graph: &GraphBatch, cotangent: &Prediction) -> Result<Params> {
        Ok(Params::new().with("w", arr1(&[cotangent.energy.sum()])))
    }
}

/// Scores every graph with its predicted energy, scaled.
#[derive(Debug, Clone, Copy)]
pub struct LinearLoss {
    pub scale: f32,
}

impl LossFn for LinearLoss {
    fn per_graph(&self, _graph: &GraphBatch, pred: &Prediction) -> Array1<f32> {
        &pred.energy * self.scale
    }

    fn per_graph_grad(&self, graph: &GraphBatch, _pred: &Prediction) -> Prediction {
        let mut grad = Prediction::zeros(graph.shape());
        grad.energy.fill(self.scale);
        grad
    }
}

/// Ignores the gradient and moves `w` to the next scripted value on every update.
pub struct ScriptedTransform {
    pub script: Vec<f32>,
    pub learning_rate: f32,
}

impl GradientTransform for ScriptedTransform {
    type State = usize;

    fn init(&self, _params: &Params) -> usize {
        0
    }

    fn update(&self, _grad: &Params, step: usize, params: &Params) -> Result<(Params, usize)> {
        let target = self.script[step.min(self.script.len() - 1)];
        let w = params.require("w")?.sum();
        Ok((Params::new().with("w", arr1(&[target - w])), step + 1))
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[derive(Default)]
pub struct RecordingCheckpoints {
    pub saved: Vec<(usize, Params)>,
}

impl CheckpointHandler for RecordingCheckpoints {
    fn save<S: Serialize>(&mut self, state: &CheckpointState<'_, S>, epoch: usize) -> Result<()> {
        self.saved.push((epoch, state.params.clone()));
        Ok(())
    }
}

pub fn loader() -> InMemoryLoader {
    let config = Configuration {
        positions: vec![[0.0; 3]],
        species: vec![0],
        energy: 0.0,
        forces: vec![[0.0; 3]],
    };

    InMemoryLoader::new(vec![config], NonZeroUsize::new(1).unwrap())
}

pub fn config(max_num_epochs: usize, patience: usize) -> TrainConfig {
    TrainConfig {
        start_epoch: 0,
        max_num_epochs,
        eval_interval: NonZeroUsize::new(1).unwrap(),
        patience: NonZeroUsize::new(patience).unwrap(),
        log_errors: ErrorReporting::PerAtomRMSE,
        max_grad_norm: Some(10.0),
    }
}

pub type ScriptedTrainer = Trainer<ScalarModel, LinearLoss, ScriptedTransform>;

pub fn trainer(script: &[f32], config: TrainConfig) -> ScriptedTrainer {
    let transform = ScriptedTransform {
        script: script.to_vec(),
        learning_rate: 1.0,
    };

    Trainer::new(ScalarModel, LinearLoss { scale: 1.0 }, transform, config)
}

pub fn initial_state() -> TrainState<usize> {
    TrainState::resume(Params::new().with("w", arr1(&[0.0])), 0)
}
