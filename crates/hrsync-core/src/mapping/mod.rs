//! Field mapping between local records and the remote field namespace

mod defaults;
mod engine;
mod transform;

pub use defaults::seed_defaults;
pub use engine::{read_path, write_path, FieldMapper};
pub use transform::{apply_transform, Direction};
