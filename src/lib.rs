//! Training and evaluation of energy and force models over batches of atomistic graphs.
//!
//! Parameters, optimizer state and moving averages are plain values: every update
//! consumes them and hands back new ones.

pub mod arch;
pub mod averaging;
pub mod checkpoint;
pub mod config;
mod error;
pub mod graph;
pub mod logger;
pub mod metrics;
pub mod optimization;
pub mod params;
pub mod runner;
pub mod training;

pub use error::{Result, TrainErr};
