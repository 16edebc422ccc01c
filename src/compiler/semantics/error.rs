use std::fmt;

use crate::compiler::ast::{BinaryOp, Type, UnaryOp};

/// Errors discovered during semantic analysis. These accumulate in an
/// `ErrorList` rather than aborting the traversal, so one bad line does not
/// hide the rest of the program's problems.
#[derive(Clone, Debug, PartialEq)]
pub enum SemanticError {
    IdentifierNotDefined(String),
    IdentifierAlreadyDeclared(String),
    IdentifierNotAVariable(String),
    NotAFunction(String),
    FunctionAlreadyDeclared(String),
    ParameterAlreadyDeclared(String),
    IllegalReturnStatement,
    ReturnType {
        expected: Type,
        actual: Type,
    },
    NumArguments {
        name: String,
        expected: usize,
        actual: usize,
    },
    ParameterType {
        name: String,
        index: usize,
        expected: Type,
        actual: Type,
    },
    AssignType {
        expected: Type,
        actual: Type,
    },
    CondType(Type),
    ExitType(Type),
    FreeType(Type),
    ReadType(Type),
    IndexingNonArrayType(Type),
    ArrayIndexType(Type),
    ArrayLiteralElemType {
        expected: Type,
        actual: Type,
    },
    FstType(Type),
    SndType(Type),
    UnaryOpType {
        op: UnaryOp,
        actual: Type,
    },
    BinaryOpType {
        op: BinaryOp,
        actual: Type,
    },
    BinaryOpDifferentTypes(Type, Type),
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SemanticError::*;
        match self {
            IdentifierNotDefined(name) => {
                write!(f, "Identifier '{}' not defined in scope", name)
            }
            IdentifierAlreadyDeclared(name) => {
                write!(f, "Identifier '{}' already declared in scope", name)
            }
            IdentifierNotAVariable(name) => {
                write!(f, "Identifier '{}' is a function, not a variable", name)
            }
            NotAFunction(name) => write!(f, "'{}' is not a function", name),
            FunctionAlreadyDeclared(name) => {
                write!(f, "Function '{}' already declared", name)
            }
            ParameterAlreadyDeclared(name) => {
                write!(f, "Parameter '{}' already declared in function signature", name)
            }
            IllegalReturnStatement => {
                f.write_str("Return statement only allowed inside a function body")
            }
            ReturnType { expected, actual } => write!(
                f,
                "Return expression of type {} does not match function return type {}",
                actual, expected
            ),
            NumArguments {
                name,
                expected,
                actual,
            } => write!(
                f,
                "Function '{}' expects {} argument(s), got {}",
                name, expected, actual
            ),
            ParameterType {
                name,
                index,
                expected,
                actual,
            } => write!(
                f,
                "Argument {} of call to '{}' has type {}, expected {}",
                index + 1,
                name,
                actual,
                expected
            ),
            AssignType { expected, actual } => write!(
                f,
                "Cannot assign expression of type {} to target of type {}",
                actual, expected
            ),
            CondType(ty) => write!(f, "Condition must be of type bool, got {}", ty),
            ExitType(ty) => write!(f, "Exit status must be of type int, got {}", ty),
            FreeType(ty) => write!(
                f,
                "Cannot free expression of type {}; only arrays and pairs are heap allocated",
                ty
            ),
            ReadType(ty) => write!(f, "Cannot read into a target of type {}", ty),
            IndexingNonArrayType(ty) => {
                write!(f, "Cannot index into expression of non-array type {}", ty)
            }
            ArrayIndexType(ty) => write!(f, "Array index must be of type int, got {}", ty),
            ArrayLiteralElemType { expected, actual } => write!(
                f,
                "Array literal element of type {} does not match earlier elements of type {}",
                actual, expected
            ),
            FstType(ty) => write!(f, "'fst' requires a pair, got {}", ty),
            SndType(ty) => write!(f, "'snd' requires a pair, got {}", ty),
            UnaryOpType { op, actual } => {
                write!(f, "Cannot apply unary operator '{}' to type {}", op, actual)
            }
            BinaryOpType { op, actual } => write!(
                f,
                "Cannot apply binary operator '{}' to operand of type {}",
                op, actual
            ),
            BinaryOpDifferentTypes(lhs, rhs) => write!(
                f,
                "Binary operator applied to mismatched operand types {} and {}",
                lhs, rhs
            ),
        }
    }
}
