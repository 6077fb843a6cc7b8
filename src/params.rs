use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn, Zip};
use serde::{Deserialize, Serialize};

use crate::{Result, TrainErr};

/// An immutable tree of named parameter tensors.
///
/// Nested modules are flattened into slash separated paths, e.g.
/// `readout/atomic_energies`. Every operation returns a brand new tree, a
/// `Params` is never mutated once it has been built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl Params {
    /// Creates an empty parameter tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this tree with an extra tensor under `path`.
    ///
    /// # Arguments
    /// * `path` - The slash separated name of the tensor.
    /// * `tensor` - The tensor, of any dimensionality.
    ///
    /// # Returns
    /// The extended tree.
    pub fn with<D>(mut self, path: impl Into<String>, tensor: ndarray::Array<f32, D>) -> Self
    where
        D: ndarray::Dimension,
    {
        self.tensors.insert(path.into(), tensor.into_dyn());
        self
    }

    pub fn get(&self, path: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(path)
    }

    /// Same as `get` but fails when the path is missing.
    ///
    /// # Arguments
    /// * `path` - The slash separated name of the tensor.
    ///
    /// # Returns
    /// The tensor or a `StructureMismatch` error.
    pub fn require(&self, path: &str) -> Result<&ArrayD<f32>> {
        self.get(path).ok_or_else(|| TrainErr::StructureMismatch {
            what: "params",
            key: path.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the total amount of scalars held by the tree.
    pub fn num_params(&self) -> usize {
        self.tensors.values().map(|t| t.len()).sum()
    }

    /// Returns true if both trees have the same paths and every tensor has the same shape.
    pub fn same_structure(&self, other: &Params) -> bool {
        self.tensors.len() == other.tensors.len()
            && self
                .tensors
                .iter()
                .zip(&other.tensors)
                .all(|((ka, a), (kb, b))| ka == kb && a.shape() == b.shape())
    }

    /// Applies `f` to every scalar of the tree.
    pub fn map<F>(&self, f: F) -> Params
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let tensors = self
            .tensors
            .iter()
            .map(|(k, t)| (k.clone(), Zip::from(t).par_map_collect(|&x| f(x))))
            .collect();

        Params { tensors }
    }

    /// Combines two trees of the same structure scalar by scalar.
    ///
    /// # Arguments
    /// * `other` - The right hand side tree.
    /// * `what` - What is being combined, used for error reporting.
    /// * `f` - The combining function, called as `f(self, other)`.
    ///
    /// # Returns
    /// The combined tree or a `StructureMismatch` if the trees differ in paths or shapes.
    pub fn zip_with<F>(&self, other: &Params, what: &'static str, f: F) -> Result<Params>
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        if self.tensors.len() != other.tensors.len() {
            let key = self
                .tensors
                .keys()
                .chain(other.tensors.keys())
                .find(|k| !(self.tensors.contains_key(*k) && other.tensors.contains_key(*k)))
                .cloned()
                .unwrap_or_default();

            return Err(TrainErr::StructureMismatch { what, key });
        }

        let mut tensors = BTreeMap::new();

        for ((ka, a), (kb, b)) in self.tensors.iter().zip(&other.tensors) {
            if ka != kb || a.shape() != b.shape() {
                return Err(TrainErr::StructureMismatch {
                    what,
                    key: ka.clone(),
                });
            }

            let combined = Zip::from(a).and(b).par_map_collect(|&x, &y| f(x, y));
            tensors.insert(ka.clone(), combined);
        }

        Ok(Params { tensors })
    }

    /// Returns `self + updates`.
    pub fn apply_updates(&self, updates: &Params) -> Result<Params> {
        self.zip_with(updates, "updates", |p, u| p + u)
    }

    /// Returns a tree of the same structure filled with zeros.
    pub fn zeros_like(&self) -> Params {
        let tensors = self
            .tensors
            .iter()
            .map(|(k, t)| (k.clone(), ArrayD::zeros(IxDyn(t.shape()))))
            .collect();

        Params { tensors }
    }
}

impl FromIterator<(String, ArrayD<f32>)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}
