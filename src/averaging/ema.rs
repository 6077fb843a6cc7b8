use serde::Serialize;

use crate::{Result, params::Params};

/// An exponential moving average of the parameters.
///
/// The shadow parameters always have the structure of the parameters they were
/// created from, `update` fails otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ema {
    params: Params,
    decay: f32,
}

impl Ema {
    /// Creates a new `Ema` whose shadow parameters start as a copy of `params`.
    ///
    /// # Arguments
    /// * `params` - The live parameters.
    /// * `decay` - The target decay rate.
    ///
    /// # Returns
    /// A new `Ema` instance.
    pub fn new(params: &Params, decay: f32) -> Self {
        Self {
            params: params.clone(),
            decay,
        }
    }

    /// Returns the shadow parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    /// Returns the decay used after `num_updates` updates, `min(decay, (1 + t) / (10 + t))`.
    #[inline]
    pub fn effective_decay(decay: f32, num_updates: u64) -> f32 {
        let t = num_updates as f32;
        decay.min((1. + t) / (10. + t))
    }

    /// Folds freshly updated parameters into the average.
    ///
    /// # Arguments
    /// * `params` - The live parameters after the update.
    /// * `num_updates` - The amount of updates made so far.
    ///
    /// # Returns
    /// The new average, or an error if `params` doesn't match the shadow structure.
    pub fn update(self, params: &Params, num_updates: u64) -> Result<Ema> {
        let d = Self::effective_decay(self.decay, num_updates);
        let shadow = self
            .params
            .zip_with(params, "ema", |s, p| d * s + (1. - d) * p)?;

        Ok(Ema {
            params: shadow,
            decay: self.decay,
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn decay_ramp_starts_at_a_tenth() {
        assert_eq!(Ema::effective_decay(0.99, 0), 0.1);
        assert_eq!(Ema::effective_decay(0.5, 0), 0.1);
    }

    #[test]
    fn decay_ramp_is_monotonic_and_reaches_the_target() {
        let decay = 0.99;
        let mut prev = 0.0;

        for t in 0..10_000 {
            let d = Ema::effective_decay(decay, t);
            assert!(d >= prev);
            assert!(d <= decay);
            prev = d;
        }

        assert_eq!(Ema::effective_decay(decay, 1_000_000), decay);
    }

    #[test]
    fn update_blends_with_ramped_decay() {
        let start = Params::new().with("w", arr1(&[0.0, 10.0]));
        let live = Params::new().with("w", arr1(&[10.0, 0.0]));

        // t = 0 -> d = 0.1
        let ema = Ema::new(&start, 0.99).update(&live, 0).unwrap();

        assert_eq!(ema.params(), &Params::new().with("w", arr1(&[9.0, 1.0])));
        assert_eq!(ema.decay(), 0.99);
        assert!(ema.params().same_structure(&live));
    }

    #[test]
    fn update_rejects_other_structures() {
        let ema = Ema::new(&Params::new().with("w", arr1(&[0.0])), 0.9);
        let other = Params::new().with("v", arr1(&[0.0]));

        assert!(ema.update(&other, 3).is_err());
    }
}
