//! Shared types, errors, and wire formats for the Olympus judge worker.

pub mod error;
pub mod limits;
pub mod model;
pub mod wire;

pub use error::JudgeError;
pub use model::*;
