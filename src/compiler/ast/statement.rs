use crate::compiler::semantics::symbol_table::ScopeId;

use super::expression::{ArrayAccess, Expr, FnCall, IdentRef, PairAccess};
use super::ty::Type;

/// The target of an assignment or `read`.
#[derive(Clone, Debug, PartialEq)]
pub enum Lvalue {
    Ident(IdentRef),
    ArrayElem(ArrayAccess),
    PairElem(PairAccess),
}

impl Lvalue {
    pub fn ty(&self) -> Type {
        match self {
            Lvalue::Ident(id) => id.ty.clone(),
            Lvalue::ArrayElem(access) => access.elem_type.clone(),
            Lvalue::PairElem(access) => access.elem_type.clone(),
        }
    }
}

/// A scope-delimited sequence of statements. The block owns a `ScopeId`
/// whose variables exist only while the block runs.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub scope: ScopeId,
    pub statements: Vec<Stat>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stat {
    Skip,
    VarDecl {
        scope: ScopeId,
        name: String,
        ty: Type,
        rhs: Expr,
    },
    Assign {
        lhs: Lvalue,
        rhs: Expr,
    },
    Read(Lvalue),
    Free(Expr),
    Return(Expr),
    Exit(Expr),
    Print(Expr),
    Println(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    /// `for ident < bound` counts `ident` from 0 up to (excluding) `bound`.
    /// The counter lives in the body's scope.
    For {
        counter: IdentRef,
        bound: i32,
        body: Block,
    },
    Begin(Block),
    Call(FnCall),
}
