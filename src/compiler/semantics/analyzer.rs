/*!
 Semantic analysis: turns the front end's parse tree into the typed AST,
 building the symbol table as it goes.

 Functions may be called before the statement that declares them. The
 analyzer makes two passes over the function list: the first records every
 function name as pending, the second declares and analyzes each one in
 order. When a call site mentions a function that is still pending, that
 function is declared on demand right then, so by the time any call is
 checked its callee's signature is in the top-level scope. A function is
 removed from the pending map *before* its body is visited, which is what
 lets mutually recursive functions terminate: the back-call finds a
 registered signature instead of triggering another declaration.

 Errors never abort the traversal. A node that fails a check is given the
 wildcard type [`Type::Any`] and analysis continues, so a single mistake
 does not drown the report in follow-on noise.
*/
use std::collections::HashMap;

use log::debug;

use crate::compiler::ast::{
    ArrayAccess, BinaryOp, Block, Expr, FnCall, FunctionDecl, IdentRef, Lvalue, PairAccess,
    PairSide, Parameter, Program, Stat, Type, UnaryOp,
};
use crate::compiler::error::{ErrorList, SEMANTIC_ERROR_CODE};
use crate::compiler::parsetree as pt;

use super::error::SemanticError;
use super::symbol_table::{Identifier, ScopeId, SymbolTable};

/// Analyzes a parse tree. On success yields the typed program and the
/// symbol table the code generator sizes frames from; on failure yields
/// every semantic error found.
pub fn analyze(tree: &pt::Program) -> Result<(Program, SymbolTable), ErrorList<SemanticError>> {
    Analyzer::new(tree).run()
}

/// Everything the statement and expression visitors need to know about
/// where they are. Passed by value so nested visits cannot leave stale
/// state behind; there is nothing to restore when a block ends.
#[derive(Clone)]
struct Ctx {
    scope: ScopeId,
    function: Option<FnCtx>,
}

#[derive(Clone)]
struct FnCtx {
    return_type: Type,
}

struct Analyzer<'a> {
    tree: &'a pt::Program,
    symbols: SymbolTable,
    errors: ErrorList<SemanticError>,
    /// Parse-tree index of the first declaration of each function name.
    first_decl: HashMap<String, usize>,
    /// Functions not yet declared; drained by `declare_function`.
    pending: HashMap<String, usize>,
    functions: Vec<FunctionDecl>,
}

impl<'a> Analyzer<'a> {
    fn new(tree: &'a pt::Program) -> Self {
        Analyzer {
            tree,
            symbols: SymbolTable::new(),
            errors: ErrorList::new(SEMANTIC_ERROR_CODE),
            first_decl: HashMap::new(),
            pending: HashMap::new(),
            functions: vec![],
        }
    }

    fn run(mut self) -> Result<(Program, SymbolTable), ErrorList<SemanticError>> {
        let tree = self.tree;

        for (i, f) in tree.functions.iter().enumerate() {
            self.first_decl.entry(f.name.clone()).or_insert(i);
        }
        self.pending = self.first_decl.clone();

        for (i, f) in tree.functions.iter().enumerate() {
            if self.first_decl.get(&f.name) != Some(&i) {
                // A later duplicate; the first declaration wins.
                self.errors
                    .add(SemanticError::FunctionAlreadyDeclared(f.name.clone()));
                continue;
            }
            if self.pending.contains_key(&f.name) {
                self.declare_function(i);
            }
        }

        let top = self.symbols.top_level();
        let body_scope = self.symbols.sub_scope(top);
        let ctx = Ctx {
            scope: body_scope,
            function: None,
        };
        let body = self.visit_scope_body(&tree.body, body_scope, &ctx);

        if self.errors.has_errors() {
            Err(self.errors)
        } else {
            Ok((
                Program {
                    functions: self.functions,
                    body,
                },
                self.symbols,
            ))
        }
    }

    /// Declares the function at parse-tree index `idx` in the top-level
    /// scope and analyzes its body. The pending entry is removed first so
    /// a recursive call inside the body resolves against the signature
    /// registered here instead of re-entering.
    fn declare_function(&mut self, idx: usize) {
        let tree = self.tree;
        let f = &tree.functions[idx];
        self.pending.remove(&f.name);
        debug!("Declaring function '{}'", f.name);

        let top = self.symbols.top_level();
        let return_type = resolve_type(&f.return_type);
        let param_scope = self.symbols.sub_scope(top);
        let body_scope = self.symbols.sub_scope(param_scope);

        let mut formals = Vec::with_capacity(f.params.len());
        for p in &f.params {
            let ty = resolve_type(&p.ty);
            if self
                .symbols
                .add(param_scope, &p.name, Identifier::Param(ty.clone()))
                .is_err()
            {
                self.errors
                    .add(SemanticError::ParameterAlreadyDeclared(p.name.clone()));
            }
            formals.push(Parameter {
                name: p.name.clone(),
                ty,
            });
        }

        let sig = Type::Function(
            Box::new(return_type.clone()),
            formals.iter().map(|p| p.ty.clone()).collect(),
        );
        if self
            .symbols
            .add(top, &f.name, Identifier::Function { ty: sig, body_scope })
            .is_err()
        {
            self.errors
                .add(SemanticError::FunctionAlreadyDeclared(f.name.clone()));
        }

        let ctx = Ctx {
            scope: body_scope,
            function: Some(FnCtx {
                return_type: return_type.clone(),
            }),
        };
        let mut statements = vec![];
        self.visit_stat(&f.body, &ctx, &mut statements);
        self.symbols.close(body_scope);
        self.symbols.close(param_scope);

        self.functions.push(FunctionDecl {
            name: f.name.clone(),
            return_type,
            formals,
            param_scope,
            body: Block {
                scope: body_scope,
                statements,
            },
        });
    }

    /// Analyzes `stat` as the body of the (already opened) `scope` and
    /// seals the scope afterwards.
    fn visit_scope_body(&mut self, stat: &pt::Stat, scope: ScopeId, ctx: &Ctx) -> Block {
        let ctx = Ctx {
            scope,
            function: ctx.function.clone(),
        };
        let mut statements = vec![];
        self.visit_stat(stat, &ctx, &mut statements);
        self.symbols.close(scope);
        Block { scope, statements }
    }

    fn visit_stat(&mut self, stat: &pt::Stat, ctx: &Ctx, out: &mut Vec<Stat>) {
        match stat {
            pt::Stat::Skip => out.push(Stat::Skip),

            pt::Stat::Seq(stats) => {
                for s in stats {
                    self.visit_stat(s, ctx, out);
                }
            }

            pt::Stat::Decl { ty, name, rhs } => {
                let declared = resolve_type(ty);
                let rhs = self.visit_rhs(rhs, ctx);
                if self.symbols.lookup(ctx.scope, name).is_some() {
                    self.errors
                        .add(SemanticError::IdentifierAlreadyDeclared(name.clone()));
                } else {
                    if !declared.compatible(&rhs.ty()) {
                        self.errors.add(SemanticError::AssignType {
                            expected: declared.clone(),
                            actual: rhs.ty(),
                        });
                    }
                    if let Err(e) =
                        self.symbols
                            .add(ctx.scope, name, Identifier::Variable(declared.clone()))
                    {
                        self.errors.add(e);
                    }
                }
                out.push(Stat::VarDecl {
                    scope: ctx.scope,
                    name: name.clone(),
                    ty: declared,
                    rhs,
                });
            }

            pt::Stat::Assign { lhs, rhs } => {
                let rhs = self.visit_rhs(rhs, ctx);
                let lhs = self.visit_lhs(lhs, ctx);
                if !lhs.ty().compatible(&rhs.ty()) {
                    self.errors.add(SemanticError::AssignType {
                        expected: lhs.ty(),
                        actual: rhs.ty(),
                    });
                }
                out.push(Stat::Assign { lhs, rhs });
            }

            pt::Stat::Read(lhs) => {
                let lhs = self.visit_lhs(lhs, ctx);
                match lhs.ty() {
                    Type::Int | Type::Char | Type::Any => (),
                    ty => self.errors.add(SemanticError::ReadType(ty)),
                }
                out.push(Stat::Read(lhs));
            }

            pt::Stat::Free(e) => {
                let e = self.visit_expr(e, ctx);
                let ty = e.ty();
                if !ty.is_heap_allocated() && ty != Type::Any {
                    self.errors.add(SemanticError::FreeType(ty));
                }
                out.push(Stat::Free(e));
            }

            pt::Stat::Return(e) => match &ctx.function {
                None => {
                    self.errors.add(SemanticError::IllegalReturnStatement);
                    out.push(Stat::Skip);
                }
                Some(fc) => {
                    let expected = fc.return_type.clone();
                    let e = self.visit_expr(e, ctx);
                    if !expected.compatible(&e.ty()) {
                        self.errors.add(SemanticError::ReturnType {
                            expected,
                            actual: e.ty(),
                        });
                    }
                    out.push(Stat::Return(e));
                }
            },

            pt::Stat::Exit(e) => {
                let e = self.visit_expr(e, ctx);
                if !e.ty().compatible(&Type::Int) {
                    self.errors.add(SemanticError::ExitType(e.ty()));
                }
                out.push(Stat::Exit(e));
            }

            pt::Stat::Print(e) => {
                let e = self.visit_expr(e, ctx);
                out.push(Stat::Print(e));
            }

            pt::Stat::Println(e) => {
                let e = self.visit_expr(e, ctx);
                out.push(Stat::Println(e));
            }

            pt::Stat::If {
                cond,
                then_stat,
                else_stat,
            } => {
                let cond = self.visit_expr(cond, ctx);
                if !cond.ty().compatible(&Type::Bool) {
                    self.errors.add(SemanticError::CondType(cond.ty()));
                }
                let then_scope = self.symbols.sub_scope(ctx.scope);
                let then_block = self.visit_scope_body(then_stat, then_scope, ctx);
                let else_scope = self.symbols.sub_scope(ctx.scope);
                let else_block = self.visit_scope_body(else_stat, else_scope, ctx);
                out.push(Stat::If {
                    cond,
                    then_block,
                    else_block,
                });
            }

            pt::Stat::While { cond, body } => {
                let cond = self.visit_expr(cond, ctx);
                if !cond.ty().compatible(&Type::Bool) {
                    self.errors.add(SemanticError::CondType(cond.ty()));
                }
                let scope = self.symbols.sub_scope(ctx.scope);
                let body = self.visit_scope_body(body, scope, ctx);
                out.push(Stat::While { cond, body });
            }

            pt::Stat::For {
                counter,
                bound,
                body,
            } => {
                let scope = self.symbols.sub_scope(ctx.scope);
                if let Err(e) = self
                    .symbols
                    .add(scope, counter, Identifier::Variable(Type::Int))
                {
                    self.errors.add(e);
                }
                let body = self.visit_scope_body(body, scope, ctx);
                out.push(Stat::For {
                    counter: IdentRef {
                        scope,
                        name: counter.clone(),
                        ty: Type::Int,
                    },
                    bound: *bound,
                    body,
                });
            }

            pt::Stat::Begin(inner) => {
                let scope = self.symbols.sub_scope(ctx.scope);
                let block = self.visit_scope_body(inner, scope, ctx);
                out.push(Stat::Begin(block));
            }

            pt::Stat::Call { name, args } => {
                let call = self.visit_call(name, args, ctx);
                out.push(Stat::Call(call));
            }
        }
    }

    fn visit_rhs(&mut self, rhs: &pt::AssignRhs, ctx: &Ctx) -> Expr {
        match rhs {
            pt::AssignRhs::Expr(e) => self.visit_expr(e, ctx),

            pt::AssignRhs::ArrayLiteral(elems) => {
                let mut elem_type = Type::Any;
                let mut typed = Vec::with_capacity(elems.len());
                for e in elems {
                    let e = self.visit_expr(e, ctx);
                    let ty = e.ty();
                    if !elem_type.compatible(&ty) {
                        self.errors.add(SemanticError::ArrayLiteralElemType {
                            expected: elem_type.clone(),
                            actual: ty,
                        });
                    } else if ty != Type::Any {
                        elem_type = ty;
                    }
                    typed.push(e);
                }
                Expr::ArrayLiteral {
                    elem_type,
                    elems: typed,
                }
            }

            pt::AssignRhs::NewPair(fst, snd) => {
                let fst = self.visit_expr(fst, ctx);
                let snd = self.visit_expr(snd, ctx);
                Expr::NewPair(Box::new(fst), Box::new(snd))
            }

            pt::AssignRhs::PairElem { side, pair } => {
                Expr::PairElem(self.visit_pair_elem(*side, pair, ctx))
            }

            pt::AssignRhs::Call { name, args } => Expr::Call(self.visit_call(name, args, ctx)),
        }
    }

    fn visit_lhs(&mut self, lhs: &pt::AssignLhs, ctx: &Ctx) -> Lvalue {
        match lhs {
            pt::AssignLhs::Ident(name) => Lvalue::Ident(self.visit_ident(name, ctx)),
            pt::AssignLhs::ArrayElem { name, indices } => {
                Lvalue::ArrayElem(self.visit_array_elem(name, indices, ctx))
            }
            pt::AssignLhs::PairElem { side, pair } => {
                Lvalue::PairElem(self.visit_pair_elem(*side, pair, ctx))
            }
        }
    }

    fn visit_expr(&mut self, expr: &pt::Expr, ctx: &Ctx) -> Expr {
        match expr {
            pt::Expr::IntLit(i) => Expr::IntLit(*i),
            pt::Expr::BoolLit(b) => Expr::BoolLit(*b),
            pt::Expr::CharLit(c) => Expr::CharLit(*c),
            pt::Expr::StrLit(s) => Expr::StrLit(s.clone()),
            pt::Expr::NullLit => Expr::NullLit,

            pt::Expr::Ident(name) => Expr::Ident(self.visit_ident(name, ctx)),

            pt::Expr::ArrayElem { name, indices } => {
                Expr::ArrayElem(self.visit_array_elem(name, indices, ctx))
            }

            pt::Expr::Unary(op, sub) => {
                let op = convert_unary(*op);
                let sub = self.visit_expr(sub, ctx);
                let sub_ty = sub.ty();
                let ok = match op {
                    UnaryOp::Len => matches!(sub_ty, Type::Array(..) | Type::Any),
                    _ => op.operand_type().compatible(&sub_ty),
                };
                if !ok {
                    self.errors
                        .add(SemanticError::UnaryOpType { op, actual: sub_ty });
                }
                Expr::Unary(op, Box::new(sub))
            }

            pt::Expr::Binary(op, lhs, rhs) => {
                let op = convert_binary(*op);
                let lhs = self.visit_expr(lhs, ctx);
                let rhs = self.visit_expr(rhs, ctx);
                let (lt, rt) = (lhs.ty(), rhs.ty());
                if let Some(allowed) = op.allowed_operand_types() {
                    if !allowed.iter().any(|t| t.compatible(&lt)) {
                        self.errors
                            .add(SemanticError::BinaryOpType { op, actual: lt.clone() });
                    } else if !allowed.iter().any(|t| t.compatible(&rt)) {
                        self.errors
                            .add(SemanticError::BinaryOpType { op, actual: rt.clone() });
                    }
                }
                if !lt.compatible(&rt) {
                    self.errors.add(SemanticError::BinaryOpDifferentTypes(lt, rt));
                }
                Expr::Binary(op, Box::new(lhs), Box::new(rhs))
            }
        }
    }

    fn visit_ident(&mut self, name: &str, ctx: &Ctx) -> IdentRef {
        let ty = match self.symbols.lookup_all(ctx.scope, name) {
            None => {
                self.errors
                    .add(SemanticError::IdentifierNotDefined(name.into()));
                Type::Any
            }
            Some(id) => match id.var_type() {
                Some(ty) => ty.clone(),
                None => {
                    self.errors
                        .add(SemanticError::IdentifierNotAVariable(name.into()));
                    Type::Any
                }
            },
        };
        IdentRef {
            scope: ctx.scope,
            name: name.into(),
            ty,
        }
    }

    fn visit_array_elem(&mut self, name: &str, indices: &[pt::Expr], ctx: &Ctx) -> ArrayAccess {
        let array = self.visit_ident(name, ctx);
        let elem_type = match array.ty.indexed(indices.len()) {
            Some(ty) => ty,
            None => {
                self.errors
                    .add(SemanticError::IndexingNonArrayType(array.ty.clone()));
                Type::Any
            }
        };
        let mut typed = Vec::with_capacity(indices.len());
        for ix in indices {
            let ix = self.visit_expr(ix, ctx);
            if !ix.ty().compatible(&Type::Int) {
                self.errors.add(SemanticError::ArrayIndexType(ix.ty()));
            }
            typed.push(ix);
        }
        ArrayAccess {
            scope: ctx.scope,
            array,
            indices: typed,
            elem_type,
            needs_bounds_check: true,
        }
    }

    fn visit_pair_elem(&mut self, side: pt::PairSide, pair: &pt::Expr, ctx: &Ctx) -> PairAccess {
        let side = convert_side(side);
        let pair = self.visit_expr(pair, ctx);
        let elem_type = match (side, pair.ty()) {
            (_, Type::Any) => Type::Any,
            (PairSide::Fst, Type::Pair(fst, _)) => *fst,
            (PairSide::Snd, Type::Pair(_, snd)) => *snd,
            (PairSide::Fst, ty) => {
                self.errors.add(SemanticError::FstType(ty));
                Type::Any
            }
            (PairSide::Snd, ty) => {
                self.errors.add(SemanticError::SndType(ty));
                Type::Any
            }
        };
        PairAccess {
            scope: ctx.scope,
            side,
            pair: Box::new(pair),
            elem_type,
        }
    }

    fn visit_call(&mut self, name: &str, args: &[pt::Expr], ctx: &Ctx) -> FnCall {
        let top = self.symbols.top_level();

        // A call may run ahead of the declaration pass; declare the callee
        // now so its signature is available for checking.
        if self.symbols.lookup(top, name).is_none() {
            if let Some(&idx) = self.pending.get(name) {
                debug!("Forward reference to '{}', declaring on demand", name);
                self.declare_function(idx);
            }
        }

        let actuals: Vec<Expr> = args.iter().map(|a| self.visit_expr(a, ctx)).collect();

        let sig = match self.symbols.lookup(top, name) {
            Some(Identifier::Function { ty, .. }) => ty.clone(),
            _ => {
                let err = if self.symbols.lookup_all(ctx.scope, name).is_some() {
                    SemanticError::NotAFunction(name.into())
                } else {
                    SemanticError::IdentifierNotDefined(name.into())
                };
                self.errors.add(err);
                return FnCall {
                    name: name.into(),
                    return_type: Type::Any,
                    actuals,
                };
            }
        };

        let (return_type, formal_tys) = match sig {
            Type::Function(ret, params) => (*ret, params),
            _ => (Type::Any, vec![]),
        };

        if formal_tys.len() != actuals.len() {
            self.errors.add(SemanticError::NumArguments {
                name: name.into(),
                expected: formal_tys.len(),
                actual: actuals.len(),
            });
        }
        for (i, (formal, actual)) in formal_tys.iter().zip(actuals.iter()).enumerate() {
            if !formal.compatible(&actual.ty()) {
                self.errors.add(SemanticError::ParameterType {
                    name: name.into(),
                    index: i,
                    expected: formal.clone(),
                    actual: actual.ty(),
                });
            }
        }

        FnCall {
            name: name.into(),
            return_type,
            actuals,
        }
    }
}

fn resolve_type(name: &pt::TypeName) -> Type {
    match name {
        pt::TypeName::Int => Type::Int,
        pt::TypeName::Bool => Type::Bool,
        pt::TypeName::Char => Type::Char,
        pt::TypeName::String => Type::String,
        pt::TypeName::Array(elem) => Type::array(resolve_type(elem), 1),
        pt::TypeName::Pair(fst, snd) => Type::pair(resolve_type(fst), resolve_type(snd)),
        pt::TypeName::ErasedPair => Type::pair(Type::Any, Type::Any),
    }
}

fn convert_side(side: pt::PairSide) -> PairSide {
    match side {
        pt::PairSide::Fst => PairSide::Fst,
        pt::PairSide::Snd => PairSide::Snd,
    }
}

fn convert_unary(op: pt::UnaryOp) -> UnaryOp {
    match op {
        pt::UnaryOp::Not => UnaryOp::Not,
        pt::UnaryOp::Neg => UnaryOp::Neg,
        pt::UnaryOp::Len => UnaryOp::Len,
        pt::UnaryOp::Ord => UnaryOp::Ord,
        pt::UnaryOp::Chr => UnaryOp::Chr,
    }
}

fn convert_binary(op: pt::BinaryOp) -> BinaryOp {
    match op {
        pt::BinaryOp::Mult => BinaryOp::Mult,
        pt::BinaryOp::Div => BinaryOp::Div,
        pt::BinaryOp::Mod => BinaryOp::Mod,
        pt::BinaryOp::Add => BinaryOp::Add,
        pt::BinaryOp::Sub => BinaryOp::Sub,
        pt::BinaryOp::Gt => BinaryOp::Gt,
        pt::BinaryOp::Gte => BinaryOp::Gte,
        pt::BinaryOp::Lt => BinaryOp::Lt,
        pt::BinaryOp::Lte => BinaryOp::Lte,
        pt::BinaryOp::Equals => BinaryOp::Equals,
        pt::BinaryOp::NotEquals => BinaryOp::NotEquals,
        pt::BinaryOp::And => BinaryOp::And,
        pt::BinaryOp::Or => BinaryOp::Or,
    }
}
