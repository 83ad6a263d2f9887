//! Conflict detection and resolution between local and remote records

mod resolver;

pub use resolver::{detect_conflicts, merge, ConflictResolver, MergeSide, Resolution, ResolutionAction};
