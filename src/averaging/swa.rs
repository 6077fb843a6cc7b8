use std::f32::consts::PI;

use log::debug;
use serde::Deserialize;

use crate::{Result, optimization::GradientTransform, params::Params};

/// An equal weight running average of every parameter snapshot it's fed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AveragedParams {
    params: Option<Params>,
    n_averaged: usize,
}

impl AveragedParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the average, or `None` if nothing was averaged yet.
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    pub fn n_averaged(&self) -> usize {
        self.n_averaged
    }

    /// Folds a new snapshot into the average.
    ///
    /// # Arguments
    /// * `params` - The snapshot.
    ///
    /// # Returns
    /// The new average or an error if the snapshot doesn't match the averaged structure.
    pub fn update(self, params: &Params) -> Result<Self> {
        let n = self.n_averaged as f32;
        let averaged = match self.params {
            None => params.clone(),
            Some(avg) => avg.zip_with(params, "swa", |a, p| a + (p - a) / (n + 1.))?,
        };

        Ok(Self {
            params: Some(averaged),
            n_averaged: self.n_averaged + 1,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnealStrategy {
    #[default]
    Cos,
    Linear,
}

impl AnnealStrategy {
    fn alpha(self, t: f32) -> f32 {
        match self {
            AnnealStrategy::Cos => (1. - (PI * t).cos()) / 2.,
            AnnealStrategy::Linear => t,
        }
    }
}

/// Anneals the learning rate of a transform towards a fixed SWA learning rate.
///
/// After `k` steps the learning rate is `swa_lr * a + initial_lr * (1 - a)`, where
/// `a` is the anneal curve evaluated at `min(1, k / anneal_epochs)`.
#[derive(Debug, Clone)]
pub struct SwaLr {
    swa_lr: f32,
    initial_lr: f32,
    anneal_epochs: usize,
    strategy: AnnealStrategy,
    steps: usize,
}

impl SwaLr {
    /// Creates a new `SwaLr`, anchored at the current learning rate of `transform`.
    ///
    /// # Arguments
    /// * `transform` - The transform whose learning rate will be annealed.
    /// * `swa_lr` - The learning rate reached at the end of the annealing.
    /// * `anneal_epochs` - The amount of steps the annealing lasts.
    /// * `strategy` - The shape of the annealing curve.
    ///
    /// # Returns
    /// A new `SwaLr` instance.
    pub fn new<T>(
        transform: &T,
        swa_lr: f32,
        anneal_epochs: usize,
        strategy: AnnealStrategy,
    ) -> Self
    where
        T: GradientTransform,
    {
        Self {
            swa_lr,
            initial_lr: transform.learning_rate(),
            anneal_epochs,
            strategy,
            steps: 0,
        }
    }

    /// Returns the learning rate after the steps taken so far.
    pub fn learning_rate(&self) -> f32 {
        let t = (self.steps as f32 / self.anneal_epochs.max(1) as f32).min(1.);
        let t = if self.anneal_epochs == 0 { 1. } else { t };
        let alpha = self.strategy.alpha(t);

        self.swa_lr * alpha + self.initial_lr * (1. - alpha)
    }

    /// Advances the schedule one step and applies the new learning rate to `transform`.
    pub fn step<T>(&mut self, transform: &mut T)
    where
        T: GradientTransform,
    {
        self.steps += 1;
        let lr = self.learning_rate();

        debug!(step = self.steps, lr = lr; "swa learning rate step");
        transform.set_learning_rate(lr);
    }
}

/// Everything the stochastic weight averaging phase needs.
#[derive(Debug, Clone)]
pub struct SwaContainer<L> {
    pub averaged: AveragedParams,
    pub scheduler: SwaLr,
    /// The first epoch of the SWA phase.
    pub start: usize,
    /// The loss used once the SWA phase starts.
    pub loss_fn: L,
}

impl<L> SwaContainer<L> {
    pub fn new(scheduler: SwaLr, start: usize, loss_fn: L) -> Self {
        Self {
            averaged: AveragedParams::new(),
            scheduler,
            start,
            loss_fn,
        }
    }
}
