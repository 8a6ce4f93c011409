//! Common types, traits, and error definitions for the trajectory tracker
//!
//! This module provides the foundational building blocks used across
//! every stage of the control pipeline.

pub mod angle;
pub mod types;
pub mod traits;
pub mod error;

pub use angle::*;
pub use types::*;
pub use traits::*;
pub use error::*;
