//! Making sure a valid index exists for a reference file

pub mod builder;
pub mod coordinator;

pub use builder::{memory_tier, IndexBuilder, JavaIndexBuilder};
pub use coordinator::{IndexCoordinator, IndexSource};
