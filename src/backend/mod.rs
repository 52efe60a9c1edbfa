//! Native code generation backends

pub mod symbolic;

pub use symbolic::SymbolicCodegen;
