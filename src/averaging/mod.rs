mod ema;
mod swa;

pub use ema::Ema;
pub use swa::{AnnealStrategy, AveragedParams, SwaContainer, SwaLr};
