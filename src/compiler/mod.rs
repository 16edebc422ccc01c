/**
 * The back half of the compiler: everything that happens after the front
 * end has accepted a program and handed over its parse tree.
 *
 * The stages run in a fixed order. Semantic analysis walks the parse
 * tree, builds the scoped symbol table and produces a typed AST; this is
 * the last stage where a user error can occur, and it collects every
 * error it finds rather than stopping at the first. After it succeeds,
 * the input is considered correct and compilable, and any fault in the
 * later stages can only come from a bug in the compiler itself.
 *
 * The bounds-check pass then elides array bounds checks it can prove
 * unnecessary. Because it runs on an already-validated tree, a failure
 * inside it is never reported to the user; the driver falls back to the
 * unoptimized tree and compiles that instead.
 *
 * Code generation translates exactly what it is given into ARM assembly,
 * pulling in the shared runtime routines (prints, reads, traps, frees)
 * that the generated code calls into.
 */
pub mod arm;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod optimizer;
pub mod parsetree;
pub mod semantics;

mod compiler;

pub use compiler::{compile, CompileError};
