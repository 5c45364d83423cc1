//! CLI command implementations

pub mod common;
pub mod config;
pub mod index;
pub mod purge;
pub mod search;
pub mod validate;

pub use config::execute as config;
pub use index::execute as index;
pub use purge::execute as purge;
pub use search::execute as search;
pub use validate::execute as validate;
