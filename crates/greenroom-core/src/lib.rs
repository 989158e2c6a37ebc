//! Greenroom core crate - shared types, error taxonomy, and configuration.
//!
//! Everything the retrieval engine's crates have in common: the chunk payload
//! written to the vector index, the prompt-input contract handed to the LLM
//! chain, the `GreenroomError` taxonomy, and the TOML configuration surface.

pub mod config;
pub mod error;
pub mod types;

pub use config::GreenroomConfig;
pub use error::{GreenroomError, Result};
pub use types::*;
