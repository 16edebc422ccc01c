/*!
 Data model of the parse tree the front end hands to this crate.

 The front end owns lexing, parsing and the purely syntactic checks; when
 it accepts a program it serializes this tree as JSON and the `bryonyc`
 driver deserializes it here. Nothing in this module is type-annotated;
 semantic analysis turns it into the typed [`crate::compiler::ast`].
*/
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub body: Stat,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub return_type: TypeName,
    pub params: Vec<Param>,
    pub body: Stat,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeName,
}

/// A syntactic type annotation. `ErasedPair` is the bare `pair` keyword
/// legal as a pair element type.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TypeName {
    Int,
    Bool,
    Char,
    String,
    Array(Box<TypeName>),
    Pair(Box<TypeName>, Box<TypeName>),
    ErasedPair,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum PairSide {
    Fst,
    Snd,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
    Len,
    Ord,
    Chr,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
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

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Expr {
    IntLit(i32),
    BoolLit(bool),
    CharLit(char),
    StrLit(String),
    NullLit,
    Ident(String),
    ArrayElem { name: String, indices: Vec<Expr> },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum AssignLhs {
    Ident(String),
    ArrayElem { name: String, indices: Vec<Expr> },
    PairElem { side: PairSide, pair: Box<Expr> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum AssignRhs {
    Expr(Expr),
    ArrayLiteral(Vec<Expr>),
    NewPair(Expr, Expr),
    PairElem { side: PairSide, pair: Expr },
    Call { name: String, args: Vec<Expr> },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Stat {
    Skip,
    Decl {
        ty: TypeName,
        name: String,
        rhs: AssignRhs,
    },
    Assign {
        lhs: AssignLhs,
        rhs: AssignRhs,
    },
    Read(AssignLhs),
    Free(Expr),
    Return(Expr),
    Exit(Expr),
    Print(Expr),
    Println(Expr),
    If {
        cond: Expr,
        then_stat: Box<Stat>,
        else_stat: Box<Stat>,
    },
    While {
        cond: Expr,
        body: Box<Stat>,
    },
    /// `for ident < bound do ... done`: counts `ident` from 0 up to the
    /// literal `bound`, exclusive.
    For {
        counter: String,
        bound: i32,
        body: Box<Stat>,
    },
    Begin(Box<Stat>),
    Seq(Vec<Stat>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let prog = Program {
            functions: vec![Function {
                name: "inc".into(),
                return_type: TypeName::Int,
                params: vec![Param {
                    name: "n".into(),
                    ty: TypeName::Int,
                }],
                body: Stat::Return(Expr::Binary(
                    BinaryOp::Add,
                    Box::new(Expr::Ident("n".into())),
                    Box::new(Expr::IntLit(1)),
                )),
            }],
            body: Stat::Seq(vec![
                Stat::Decl {
                    ty: TypeName::Int,
                    name: "x".into(),
                    rhs: AssignRhs::Call {
                        name: "inc".into(),
                        args: vec![Expr::IntLit(41)],
                    },
                },
                Stat::Println(Expr::Ident("x".into())),
            ]),
        };

        let json = serde_json::to_string(&prog).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prog);
    }
}
