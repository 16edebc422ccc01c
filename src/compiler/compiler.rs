/*!
 The compilation pipeline: typed-AST construction and checking, the
 bounds-check pass, and ARM code generation, glued end to end.

 The optimizer is transactional. It runs on a clone of the checked
 program, and the clone only replaces the original when the pass reports
 success; a pass failure means its own bookkeeping went inconsistent, so
 the driver logs the rejection and compiles the unoptimized tree instead
 of surfacing an error for a program that is perfectly valid.
*/
use std::fmt;

use log::{debug, info};

use crate::compiler::ast::Program;
use crate::compiler::codegen::{self, CodeGenError};
use crate::compiler::error::{ErrorList, SEMANTIC_ERROR_CODE};
use crate::compiler::optimizer::eliminate_bounds_checks;
use crate::compiler::parsetree;
use crate::compiler::semantics::{analyze, SemanticError};

/// Everything that can stop the pipeline after the front end accepted
/// the input.
#[derive(Clone, Debug, PartialEq)]
pub enum CompileError {
    Semantic(ErrorList<SemanticError>),
    CodeGen(CodeGenError),
}

impl CompileError {
    /// The process exit code the driver reports for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Semantic(errs) => errs.exit_code(),
            CompileError::CodeGen(_) => SEMANTIC_ERROR_CODE,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Semantic(errs) => write!(f, "{}", errs),
            CompileError::CodeGen(err) => write!(f, "{}", err),
        }
    }
}

impl From<CodeGenError> for CompileError {
    fn from(err: CodeGenError) -> Self {
        CompileError::CodeGen(err)
    }
}

/// Compiles a parse tree to ARM assembly text.
pub fn compile(tree: &parsetree::Program) -> Result<String, CompileError> {
    info!("Start: semantic analysis");
    let (program, symbols) = analyze(tree).map_err(CompileError::Semantic)?;

    info!("Start: bounds-check elimination");
    let program = optimized(&program);

    info!("Start: code generation");
    let module = codegen::generate(&program, &symbols)?;
    Ok(module.render())
}

/// Runs the bounds-check pass on a clone of `program`, keeping the clone
/// only when the pass succeeds. A rejected pass leaves the program with
/// every check it came in with.
fn optimized(program: &Program) -> Program {
    let mut candidate = program.clone();
    match eliminate_bounds_checks(&mut candidate) {
        Ok(count) => {
            debug!("Bounds-check pass elided {} check(s)", count);
            candidate
        }
        Err(err) => {
            info!("Bounds-check pass rejected: {}. Keeping all checks", err);
            program.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parsetree::{
        AssignLhs, AssignRhs, BinaryOp, Expr, Function, Param, Program, Stat, TypeName,
    };

    fn main_only(body: Stat) -> Program {
        Program {
            functions: vec![],
            body,
        }
    }

    #[test]
    fn exit_statement_compiles_to_an_exit_call() {
        let out = compile(&main_only(Stat::Exit(Expr::IntLit(7)))).unwrap();
        assert!(out.contains("LDR r4, =7"));
        assert!(out.contains("MOV r0, r4"));
        assert!(out.contains("BL exit"));
    }

    #[test]
    fn semantic_failure_reports_exit_code_200() {
        let err = compile(&main_only(Stat::Exit(Expr::BoolLit(true)))).unwrap_err();
        assert_eq!(err.exit_code(), 200);
        let report = err.to_string();
        assert!(report.contains("1 error(s) detected during compilation!"));
        assert!(report.contains("Exit code 200 returned."));
    }

    #[test]
    fn function_calls_compile_through_the_whole_pipeline() {
        let prog = Program {
            functions: vec![Function {
                name: "double".into(),
                return_type: TypeName::Int,
                params: vec![Param {
                    name: "n".into(),
                    ty: TypeName::Int,
                }],
                body: Stat::Return(Expr::Binary(
                    BinaryOp::Add,
                    Box::new(Expr::Ident("n".into())),
                    Box::new(Expr::Ident("n".into())),
                )),
            }],
            body: Stat::Seq(vec![
                Stat::Decl {
                    ty: TypeName::Int,
                    name: "x".into(),
                    rhs: AssignRhs::Call {
                        name: "double".into(),
                        args: vec![Expr::IntLit(21)],
                    },
                },
                Stat::Exit(Expr::Ident("x".into())),
            ]),
        };
        let out = compile(&prog).unwrap();
        assert!(out.contains("f_double:"));
        assert!(out.contains("BL f_double"));
        assert!(out.contains("BLVS p_throw_overflow_error"));
    }

    #[test]
    fn provably_safe_array_access_skips_the_bounds_check() {
        let prog = main_only(Stat::Seq(vec![
            Stat::Decl {
                ty: TypeName::Array(Box::new(TypeName::Int)),
                name: "a".into(),
                rhs: AssignRhs::ArrayLiteral(vec![Expr::IntLit(1), Expr::IntLit(2)]),
            },
            Stat::Println(Expr::ArrayElem {
                name: "a".into(),
                indices: vec![Expr::IntLit(0)],
            }),
        ]));
        let out = compile(&prog).unwrap();
        assert!(!out.contains("p_check_array_bounds"));
    }

    #[test]
    fn dynamic_array_access_keeps_the_bounds_check() {
        let prog = main_only(Stat::Seq(vec![
            Stat::Decl {
                ty: TypeName::Int,
                name: "i".into(),
                rhs: AssignRhs::Expr(Expr::IntLit(0)),
            },
            Stat::Decl {
                ty: TypeName::Array(Box::new(TypeName::Int)),
                name: "a".into(),
                rhs: AssignRhs::ArrayLiteral(vec![Expr::IntLit(1), Expr::IntLit(2)]),
            },
            Stat::Println(Expr::ArrayElem {
                name: "a".into(),
                indices: vec![Expr::Ident("i".into())],
            }),
        ]));
        let out = compile(&prog).unwrap();
        assert!(out.contains("BL p_check_array_bounds"));
        assert!(out.contains("p_check_array_bounds:"));
    }

    #[test]
    fn rejected_optimizer_pass_rolls_the_whole_tree_back() {
        use crate::compiler::ast;
        use crate::compiler::semantics::analyze;

        let tree = main_only(Stat::Seq(vec![
            Stat::Decl {
                ty: TypeName::Array(Box::new(TypeName::Int)),
                name: "a".into(),
                rhs: AssignRhs::ArrayLiteral(vec![
                    Expr::IntLit(1),
                    Expr::IntLit(2),
                    Expr::IntLit(3),
                ]),
            },
            Stat::Println(Expr::ArrayElem {
                name: "a".into(),
                indices: vec![Expr::IntLit(0)],
            }),
            Stat::Println(Expr::ArrayElem {
                name: "a".into(),
                indices: vec![Expr::IntLit(1)],
            }),
        ]));
        let (mut program, _) = analyze(&tree).unwrap();

        // Sabotage the tree: the second access claims its check is gone
        // already, so the pass fails when it proves that access in range.
        match &mut program.body.statements[2] {
            ast::Stat::Println(ast::Expr::ArrayElem(access)) => {
                access.needs_bounds_check = false;
            }
            other => panic!("unexpected statement {:?}", other),
        }

        let result = optimized(&program);
        // Nothing of the failed run survives: the first access keeps its
        // check even though the pass elided it before failing.
        assert_eq!(result, program);
        match &result.body.statements[1] {
            ast::Stat::Println(ast::Expr::ArrayElem(access)) => {
                assert!(access.needs_bounds_check);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn read_into_an_undeclared_variable_collects_the_error() {
        let err = compile(&main_only(Stat::Read(AssignLhs::Ident("x".into())))).unwrap_err();
        match err {
            CompileError::Semantic(errs) => assert_eq!(errs.len(), 1),
            other => panic!("expected a semantic error, got {:?}", other),
        }
    }
}
