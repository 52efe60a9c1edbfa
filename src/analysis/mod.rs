//! Method body analysis
//!
//! The reference [`TypeInferer`](crate::exttypes::TypeInferer) used when no
//! external inference engine is plugged into the compiler.

pub mod inference;

pub use inference::{InferredBody, MethodInferer, NUMERIC_PROMOTION};
