//! Typthon extension types
//!
//! Compiles Python classes decorated with `@jit` into extension types: a
//! fixed native attribute layout plus a virtual method table, built on top of
//! previously compiled extension bases.

pub mod analysis;
pub mod backend;
pub mod core;
pub mod errors;
pub mod exttypes;
pub mod frontend;
pub mod infrastructure;

pub use crate::core::Type;
pub use analysis::MethodInferer;
pub use backend::SymbolicCodegen;
pub use errors::{CompileError, Result, SourceLocation};
pub use exttypes::{
    BaseClass, CompileFlags, CompilerBackend, ExtensionCompiler, ExtensionType, PyClass, PyFunction,
    TypeRegistry, ValidatorSet,
};
pub use frontend::{cli_main, parse_module, read_classes, Config};
pub use infrastructure::{CompileMetrics, ModuleCompiler, ModuleReport};
