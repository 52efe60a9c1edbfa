//! Core type system components
//!
//! This module contains the type model shared by the frontend, the
//! extension-type compiler and the reference inference engine.

pub mod types;

pub use types::{Type, POINTER_SIZE};
