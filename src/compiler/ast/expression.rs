use std::fmt;

use crate::compiler::semantics::symbol_table::ScopeId;

use super::ty::Type;

/// A resolved reference to a named variable or parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentRef {
    pub scope: ScopeId,
    pub name: String,
    pub ty: Type,
}

/// Which element of a pair an access targets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PairSide {
    Fst,
    Snd,
}

/// An indexed read or write of an array variable, `a[i][j]...`.
///
/// `elem_type` is the type of the value the full index chain produces.
/// `needs_bounds_check` starts out `true` for every access and is cleared
/// only by the bounds-check elimination pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayAccess {
    pub scope: ScopeId,
    pub array: IdentRef,
    pub indices: Vec<Expr>,
    pub elem_type: Type,
    pub needs_bounds_check: bool,
}

/// `fst e` / `snd e` on a pair-typed expression.
#[derive(Clone, Debug, PartialEq)]
pub struct PairAccess {
    pub scope: ScopeId,
    pub side: PairSide,
    pub pair: Box<Expr>,
    pub elem_type: Type,
}

/// A call to a declared function.
#[derive(Clone, Debug, PartialEq)]
pub struct FnCall {
    pub name: String,
    pub return_type: Type,
    pub actuals: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
    Len,
    Ord,
    Chr,
}

impl UnaryOp {
    /// The operand type this operator requires. `Len` is special-cased by
    /// the analyzer (any array works) and reports `Any` here.
    pub fn operand_type(self) -> Type {
        match self {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg => Type::Int,
            UnaryOp::Len => Type::Any,
            UnaryOp::Ord => Type::Char,
            UnaryOp::Chr => Type::Int,
        }
    }

    pub fn result_type(self) -> Type {
        match self {
            UnaryOp::Not => Type::Bool,
            UnaryOp::Neg | UnaryOp::Len | UnaryOp::Ord => Type::Int,
            UnaryOp::Chr => Type::Char,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => f.write_str("!"),
            UnaryOp::Neg => f.write_str("-"),
            UnaryOp::Len => f.write_str("len"),
            UnaryOp::Ord => f.write_str("ord"),
            UnaryOp::Chr => f.write_str("chr"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BinaryOp {
    Mult,
    Div,
    Mod,
    Add,
    Sub,
    Gt,
    Gte,
    Lt,
    Lte,
    Equals,
    NotEquals,
    And,
    Or,
}

impl BinaryOp {
    /// Types the operands may have, or `None` when any pair of compatible
    /// types is allowed (equality).
    pub fn allowed_operand_types(self) -> Option<&'static [Type]> {
        match self {
            BinaryOp::Mult | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Add | BinaryOp::Sub => {
                Some(&[Type::Int])
            }
            BinaryOp::Gt | BinaryOp::Gte | BinaryOp::Lt | BinaryOp::Lte => {
                Some(&[Type::Int, Type::Char])
            }
            BinaryOp::Equals | BinaryOp::NotEquals => None,
            BinaryOp::And | BinaryOp::Or => Some(&[Type::Bool]),
        }
    }

    pub fn result_type(self) -> Type {
        match self {
            BinaryOp::Mult | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Add | BinaryOp::Sub => {
                Type::Int
            }
            _ => Type::Bool,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Mult => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Equals => "==",
            BinaryOp::NotEquals => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(s)
    }
}

/// A type-annotated expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntLit(i32),
    BoolLit(bool),
    CharLit(char),
    StrLit(String),
    NullLit,
    Ident(IdentRef),
    ArrayElem(ArrayAccess),
    PairElem(PairAccess),
    ArrayLiteral { elem_type: Type, elems: Vec<Expr> },
    NewPair(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(FnCall),
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::IntLit(_) => Type::Int,
            Expr::BoolLit(_) => Type::Bool,
            Expr::CharLit(_) => Type::Char,
            Expr::StrLit(_) => Type::String,
            Expr::NullLit => Type::pair(Type::Any, Type::Any),
            Expr::Ident(id) => id.ty.clone(),
            Expr::ArrayElem(access) => access.elem_type.clone(),
            Expr::PairElem(access) => access.elem_type.clone(),
            Expr::ArrayLiteral { elem_type, .. } => Type::array(elem_type.clone(), 1),
            Expr::NewPair(fst, snd) => Type::pair(fst.ty(), snd.ty()),
            Expr::Unary(op, _) => op.result_type(),
            Expr::Binary(op, _, _) => op.result_type(),
            Expr::Call(call) => call.return_type.clone(),
        }
    }
}
