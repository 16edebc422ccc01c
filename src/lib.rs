pub mod cli;
pub mod compiler;

pub use cli::*;
pub use compiler::{compile, CompileError};
