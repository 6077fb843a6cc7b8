use std::num::NonZeroUsize;

use rand::{rngs::StdRng, seq::SliceRandom};

use super::{Configuration, RawBatch};
use crate::Result;

/// A finite, restartable source of batches.
///
/// Every call to `batches` starts a new pass over the data.
pub trait GraphLoader {
    /// Returns the amount of batches yielded per pass.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new pass over the data.
    fn batches(&mut self) -> impl Iterator<Item = Result<RawBatch>> + '_;
}

/// Batches an in-memory list of configurations.
#[derive(Debug, Clone)]
pub struct InMemoryLoader {
    configs: Vec<Configuration>,
    order: Vec<usize>,
    batch_size: NonZeroUsize,
    drop_last: bool,
    rng: Option<StdRng>,
}

impl InMemoryLoader {
    /// Creates a new `InMemoryLoader` that yields the configurations in order.
    ///
    /// # Arguments
    /// * `configs` - The configurations to batch.
    /// * `batch_size` - The maximum amount of configurations per batch.
    ///
    /// # Returns
    /// A new `InMemoryLoader` instance.
    pub fn new(configs: Vec<Configuration>, batch_size: NonZeroUsize) -> Self {
        Self {
            order: (0..configs.len()).collect(),
            configs,
            batch_size,
            drop_last: false,
            rng: None,
        }
    }

    /// Reshuffles the configurations at the start of every pass.
    pub fn shuffled(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Skips the trailing batch when it is smaller than the batch size.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl GraphLoader for InMemoryLoader {
    fn len(&self) -> usize {
        let n = self.configs.len();
        let bs = self.batch_size.get();

        if self.drop_last { n / bs } else { n.div_ceil(bs) }
    }

    fn batches(&mut self) -> impl Iterator<Item = Result<RawBatch>> + '_ {
        if let Some(rng) = &mut self.rng {
            self.order.shuffle(rng);
        }

        let bs = self.batch_size.get();
        let drop_last = self.drop_last;
        let configs = &self.configs;

        self.order
            .chunks(bs)
            .filter(move |chunk| !drop_last || chunk.len() == bs)
            .map(move |chunk| RawBatch::from_configurations(chunk.iter().map(|&i| &configs[i])))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn configs(n: usize) -> Vec<Configuration> {
        (0..n)
            .map(|i| Configuration {
                positions: vec![[i as f32, 0.0, 0.0]],
                species: vec![0],
                energy: i as f32,
                forces: vec![[0.0; 3]],
            })
            .collect()
    }

    fn energies(loader: &mut InMemoryLoader) -> Vec<Vec<f32>> {
        loader
            .batches()
            .map(|b| b.unwrap().energy.to_vec())
            .collect()
    }

    #[test]
    fn batches_in_order() {
        let mut loader = InMemoryLoader::new(configs(5), NonZeroUsize::new(2).unwrap());

        assert_eq!(loader.len(), 3);
        assert_eq!(
            energies(&mut loader),
            [vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0]]
        );
    }

    #[test]
    fn drop_last_skips_partial_batch() {
        let mut loader =
            InMemoryLoader::new(configs(5), NonZeroUsize::new(2).unwrap()).drop_last(true);

        assert_eq!(loader.len(), 2);
        assert_eq!(energies(&mut loader).len(), 2);
    }

    #[test]
    fn restarts_every_pass() {
        let mut loader = InMemoryLoader::new(configs(3), NonZeroUsize::new(3).unwrap());

        assert_eq!(energies(&mut loader), energies(&mut loader));
    }

    #[test]
    fn shuffling_keeps_every_configuration() {
        let rng = StdRng::seed_from_u64(42);
        let mut loader =
            InMemoryLoader::new(configs(10), NonZeroUsize::new(4).unwrap()).shuffled(rng);

        for _ in 0..3 {
            let mut seen: Vec<f32> = energies(&mut loader).into_iter().flatten().collect();
            seen.sort_by(f32::total_cmp);
            assert_eq!(seen, (0..10).map(|i| i as f32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn empty_loader_yields_nothing() {
        let mut loader = InMemoryLoader::new(vec![], NonZeroUsize::new(4).unwrap());

        assert!(loader.is_empty());
        assert_eq!(loader.batches().count(), 0);
    }
}
