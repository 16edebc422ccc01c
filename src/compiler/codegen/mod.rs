mod generator;
mod state;

pub use generator::{generate, CodeGenError};
