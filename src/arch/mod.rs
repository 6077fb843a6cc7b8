mod harmonic;
pub mod loss;
mod model;

pub use harmonic::{ATOMIC_ENERGIES, HarmonicModel, STIFFNESS};
pub use model::{Model, Prediction};
