mod batch;
mod configuration;
mod loader;

pub use batch::{BatchShape, GraphBatch, Padding, RawBatch, pad_with_graphs};
pub use configuration::{Configuration, load_configurations};
pub use loader::{GraphLoader, InMemoryLoader};
