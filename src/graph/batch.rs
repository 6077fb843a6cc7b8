use ndarray::{Array1, Array2, s};
use serde::Deserialize;

use super::Configuration;
use crate::{Result, TrainErr};

/// A batch of real graphs concatenated along the node axis.
///
/// Graph `g` owns the nodes `ptr[g]..ptr[g + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch {
    pub positions: Array2<f32>,
    pub species: Array1<usize>,
    pub energy: Array1<f32>,
    pub forces: Array2<f32>,
    pub ptr: Array1<usize>,
}

impl RawBatch {
    /// Concatenates configurations into a batch.
    ///
    /// # Arguments
    /// * `configs` - The configurations, in batch order.
    ///
    /// # Returns
    /// The batch or an error if a configuration is inconsistent.
    pub fn from_configurations<'a, I>(configs: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Configuration>,
    {
        let mut positions = Vec::new();
        let mut species = Vec::new();
        let mut forces = Vec::new();
        let mut energy = Vec::new();
        let mut ptr = vec![0];

        for config in configs {
            config.validate()?;

            positions.extend(config.positions.iter().flatten());
            forces.extend(config.forces.iter().flatten());
            species.extend_from_slice(&config.species);
            energy.push(config.energy);
            ptr.push(ptr[ptr.len() - 1] + config.num_atoms());
        }

        let n_node = species.len();

        Ok(Self {
            positions: Array2::from_shape_vec((n_node, 3), positions)?,
            species: Array1::from(species),
            energy: Array1::from(energy),
            forces: Array2::from_shape_vec((n_node, 3), forces)?,
            ptr: Array1::from(ptr),
        })
    }

    #[inline]
    pub fn num_graphs(&self) -> usize {
        self.energy.len()
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.species.len()
    }

    /// Returns the amount of atoms of every graph, `ptr[1:] - ptr[:-1]`.
    pub fn atoms_per_graph(&self) -> Array1<usize> {
        let n = self.ptr.len();
        &self.ptr.slice(s![1..]) - &self.ptr.slice(s![..n - 1])
    }
}

/// The shape signature of a padded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchShape {
    pub n_graph: usize,
    pub n_node: usize,
}

/// A batch padded to a fixed amount of graphs and nodes.
///
/// The trailing graphs are filler, `graph_mask` is `true` only for the real ones.
/// Every padding node belongs to the first padding graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphBatch {
    pub positions: Array2<f32>,
    pub species: Array1<usize>,
    /// Index of the graph each node belongs to.
    pub node_graph: Array1<usize>,
    pub n_node: Array1<usize>,
    pub energy: Array1<f32>,
    pub forces: Array2<f32>,
    pub graph_mask: Array1<bool>,
}

impl GraphBatch {
    #[inline]
    pub fn shape(&self) -> BatchShape {
        BatchShape {
            n_graph: self.n_node.len(),
            n_node: self.species.len(),
        }
    }

    /// Returns the amount of graphs that are not padding.
    pub fn num_real_graphs(&self) -> usize {
        self.graph_mask.iter().filter(|&&m| m).count()
    }

    /// Returns the amount of nodes that belong to real graphs.
    pub fn num_real_nodes(&self) -> usize {
        self.n_node
            .iter()
            .zip(&self.graph_mask)
            .filter(|&(_, &m)| m)
            .map(|(&n, _)| n)
            .sum()
    }

    /// Sums a per-node quantity into a per-graph one.
    ///
    /// # Arguments
    /// * `values` - One value per node.
    ///
    /// # Returns
    /// One value per graph, padding graphs included.
    pub fn sum_per_graph(&self, values: &Array1<f32>) -> Array1<f32> {
        let mut sums = Array1::zeros(self.n_node.len());

        for (&g, &v) in self.node_graph.iter().zip(values) {
            sums[g] += v;
        }

        sums
    }
}

/// Pads a raw batch with filler graphs.
///
/// # Arguments
/// * `raw` - The batch of real graphs.
/// * `n_node` - The amount of nodes of the padded batch, must exceed the real ones.
/// * `n_graph` - The amount of graphs of the padded batch, must exceed the real ones.
///
/// # Returns
/// The padded batch or a `SizeMismatch` error if the batch doesn't fit.
pub fn pad_with_graphs(raw: &RawBatch, n_node: usize, n_graph: usize) -> Result<GraphBatch> {
    let real_nodes = raw.num_nodes();
    let real_graphs = raw.num_graphs();

    if n_node <= real_nodes {
        return Err(TrainErr::SizeMismatch {
            what: "padded nodes",
            got: n_node,
            expected: real_nodes + 1,
        });
    }

    if n_graph <= real_graphs {
        return Err(TrainErr::SizeMismatch {
            what: "padded graphs",
            got: n_graph,
            expected: real_graphs + 1,
        });
    }

    let mut positions = Array2::zeros((n_node, 3));
    positions
        .slice_mut(s![..real_nodes, ..])
        .assign(&raw.positions);

    let mut forces = Array2::zeros((n_node, 3));
    forces.slice_mut(s![..real_nodes, ..]).assign(&raw.forces);

    let mut species = Array1::zeros(n_node);
    species.slice_mut(s![..real_nodes]).assign(&raw.species);

    let mut energy = Array1::zeros(n_graph);
    energy.slice_mut(s![..real_graphs]).assign(&raw.energy);

    let mut counts = Array1::zeros(n_graph);
    counts
        .slice_mut(s![..real_graphs])
        .assign(&raw.atoms_per_graph());
    counts[real_graphs] = n_node - real_nodes;

    let node_graph = counts
        .iter()
        .enumerate()
        .flat_map(|(g, &n)| std::iter::repeat_n(g, n))
        .collect();

    let graph_mask = (0..n_graph).map(|g| g < real_graphs).collect();

    Ok(GraphBatch {
        positions,
        species,
        node_graph,
        n_node: counts,
        energy,
        forces,
        graph_mask,
    })
}

/// The padding policy applied to every batch before it reaches the model.
///
/// Sizes left unset are derived from the batch: one spare graph, and the node
/// count rounded up to the next power of two so that the amount of distinct
/// batch shapes stays small.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Padding {
    #[serde(default)]
    pub n_node: Option<usize>,
    #[serde(default)]
    pub n_graph: Option<usize>,
}

impl Padding {
    /// Creates a fixed size padding.
    pub fn fixed(n_node: usize, n_graph: usize) -> Self {
        Self {
            n_node: Some(n_node),
            n_graph: Some(n_graph),
        }
    }

    /// Pads `raw` following this policy.
    pub fn pad(&self, raw: &RawBatch) -> Result<GraphBatch> {
        let n_node = self
            .n_node
            .unwrap_or_else(|| (raw.num_nodes() + 1).next_power_of_two());
        let n_graph = self.n_graph.unwrap_or(raw.num_graphs() + 1);

        pad_with_graphs(raw, n_node, n_graph)
    }
}
