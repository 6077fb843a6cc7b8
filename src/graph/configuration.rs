use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

/// A single labelled atomistic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Cartesian positions, one row per atom.
    pub positions: Vec<[f32; 3]>,
    /// Species index per atom.
    pub species: Vec<usize>,
    /// Reference total energy.
    pub energy: f32,
    /// Reference forces, one row per atom.
    pub forces: Vec<[f32; 3]>,
}

impl Configuration {
    #[inline]
    pub fn num_atoms(&self) -> usize {
        self.positions.len()
    }

    /// Checks that every per-atom array has one entry per atom.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_atoms();

        if self.species.len() != n {
            return Err(TrainErr::SizeMismatch {
                what: "species",
                got: self.species.len(),
                expected: n,
            });
        }

        if self.forces.len() != n {
            return Err(TrainErr::SizeMismatch {
                what: "forces",
                got: self.forces.len(),
                expected: n,
            });
        }

        Ok(())
    }
}

/// Loads a list of configurations from a JSON file.
///
/// # Arguments
/// * `path` - The path to a JSON array of configurations.
///
/// # Returns
/// The validated configurations, or an error if the file can't be read, parsed or
/// holds inconsistent configurations.
pub fn load_configurations(path: impl AsRef<Path>) -> Result<Vec<Configuration>> {
    let content = fs::read_to_string(path)?;
    let configs: Vec<Configuration> = serde_json::from_str(&content)?;

    for config in &configs {
        config.validate()?;
    }

    Ok(configs)
}
