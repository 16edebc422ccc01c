/*!
 The typed abstract syntax tree.

 Nodes in this tree are produced by semantic analysis and carry their
 resolved type plus the `ScopeId` of the symbol-table scope they belong to.
 Everything is `Clone` so that optimization passes can work on a copy and
 discard it wholesale if they go wrong.
*/
mod expression;
mod statement;

pub mod ty;

pub use expression::{
    ArrayAccess, BinaryOp, Expr, FnCall, IdentRef, PairAccess, PairSide, UnaryOp,
};
pub use statement::{Block, Lvalue, Stat};
pub use ty::Type;

use crate::compiler::semantics::symbol_table::ScopeId;

/// A function declaration with its analyzed body.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub return_type: Type,
    pub formals: Vec<Parameter>,
    /// Scope holding the formals; the body's scope is its child.
    pub param_scope: ScopeId,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

/// A fully analyzed program: its functions plus the main body.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub functions: Vec<FunctionDecl>,
    pub body: Block,
}
