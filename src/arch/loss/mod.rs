mod loss_fn;
mod weighted;

pub use loss_fn::{LossFn, masked_mean};
pub use weighted::WeightedEnergyForces;
