//! Frontend components
//!
//! Parsing Python sources into class declarations, plus the configuration
//! and CLI that drive the compiler.

pub mod annotations;
pub mod classes;
pub mod cli;
pub mod config;
pub mod location;
pub mod parser;

pub use classes::{read_classes, ClassDecl};
pub use cli::main as cli_main;
pub use config::Config;
pub use location::LineIndex;
pub use parser::parse_module;
