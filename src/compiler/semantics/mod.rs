/*
 * Semantic analysis of the parse tree. This includes:
 * 1. Type checking: determining the type of every expression and making
 *    sure the types satisfy each construct's restrictions.
 * 2. Resolving every identifier against the scoped symbol table, including
 *    functions that are called before their declaration is reached.
 * 3. Constructing the symbol table the code generator later sizes stack
 *    frames from.
 */

pub mod analyzer;
pub mod error;
pub mod symbol_table;

pub use analyzer::analyze;
pub use error::SemanticError;
