/*!
 Array bounds-check elimination.

 Every array access leaves semantic analysis with `needs_bounds_check`
 set. This pass walks the typed AST and clears the flag for accesses it
 can prove in range: the index is an integer literal and the array
 variable still holds an array literal of known length on every path that
 reaches the access. Anything weaker keeps the runtime check.

 The pass mutates the tree it is given. The driver runs it on a clone and
 only adopts the clone when the pass returns `Ok`, so a failure (which
 signals an inconsistency in the pass's own bookkeeping, not a user error)
 silently falls back to the fully checked program.
*/
use std::collections::{HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::compiler::ast::{ArrayAccess, Block, Expr, Lvalue, Program, Stat, Type};

/// Failures of the pass's own reasoning. Either of these means the tree
/// being transformed can no longer be trusted and must be discarded.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizationError {
    /// An access was about to be elided twice.
    AlreadyElided { array: String },
    /// A recorded array length that cannot exist.
    InvalidLength { array: String, len: i32 },
}

impl fmt::Display for OptimizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationError::AlreadyElided { array } => {
                write!(f, "bounds check on '{}' elided twice", array)
            }
            OptimizationError::InvalidLength { array, len } => {
                write!(f, "recorded impossible length {} for '{}'", len, array)
            }
        }
    }
}

/// Runs the pass over every function body and the main body. Returns the
/// number of checks elided.
pub fn eliminate_bounds_checks(program: &mut Program) -> Result<usize, OptimizationError> {
    let mut count = 0;
    for f in &mut program.functions {
        let mut pass = BoundsCheckPass::new();
        count += pass.walk_block(&mut f.body)?;
    }
    let mut pass = BoundsCheckPass::new();
    count += pass.walk_block(&mut program.body)?;
    debug!("Elided {} array bounds check(s)", count);
    Ok(count)
}

/// One map layer per open scope: array name to its length, if the pass
/// still knows it. An entry of `None` is a declared array whose length is
/// unknown; its presence still matters for shadowing.
struct BoundsCheckPass {
    known: Vec<HashMap<String, Option<i32>>>,
}

impl BoundsCheckPass {
    fn new() -> Self {
        BoundsCheckPass { known: vec![] }
    }

    fn walk_block(&mut self, block: &mut Block) -> Result<usize, OptimizationError> {
        self.known.push(HashMap::new());
        let mut n = 0;
        for stat in &mut block.statements {
            n += self.walk_stat(stat)?;
        }
        self.known.pop();
        Ok(n)
    }

    /// Declares `name` in the innermost scope.
    fn record(&mut self, name: &str, len: Option<i32>) {
        if let Some(layer) = self.known.last_mut() {
            layer.insert(name.into(), len);
        }
    }

    /// Reassignment: replace whatever is known about the binding `name`
    /// currently resolves to.
    fn update(&mut self, name: &str, len: Option<i32>) {
        for layer in self.known.iter_mut().rev() {
            if let Some(entry) = layer.get_mut(name) {
                *entry = len;
                return;
            }
        }
        // Unseen binding (e.g. a function parameter): remember only that
        // its length is now unknown.
        self.record(name, None);
    }

    fn lookup(&self, name: &str) -> Option<i32> {
        for layer in self.known.iter().rev() {
            if let Some(entry) = layer.get(name) {
                return *entry;
            }
        }
        None
    }

    fn walk_stat(&mut self, stat: &mut Stat) -> Result<usize, OptimizationError> {
        match stat {
            Stat::Skip => Ok(0),

            Stat::VarDecl { name, ty, rhs, .. } => {
                let n = self.walk_expr(rhs)?;
                if let Type::Array(..) = ty {
                    self.record(name, literal_len(rhs));
                }
                Ok(n)
            }

            Stat::Assign { lhs, rhs } => {
                let mut n = self.walk_expr(rhs)?;
                match lhs {
                    Lvalue::Ident(id) => {
                        if let Type::Array(..) = id.ty {
                            self.update(&id.name, literal_len(rhs));
                        }
                    }
                    Lvalue::ArrayElem(access) => {
                        // Writing an element never changes the length.
                        n += self.walk_access(access)?;
                    }
                    Lvalue::PairElem(access) => {
                        n += self.walk_expr(&mut access.pair)?;
                    }
                }
                Ok(n)
            }

            Stat::Read(lhs) => match lhs {
                Lvalue::Ident(_) => Ok(0),
                Lvalue::ArrayElem(access) => self.walk_access(access),
                Lvalue::PairElem(access) => self.walk_expr(&mut access.pair),
            },

            Stat::Free(e) => {
                let n = self.walk_expr(e)?;
                if let Expr::Ident(id) = e {
                    self.update(&id.name, None);
                }
                Ok(n)
            }

            Stat::Return(e) | Stat::Exit(e) | Stat::Print(e) | Stat::Println(e) => {
                self.walk_expr(e)
            }

            Stat::If {
                cond,
                then_block,
                else_block,
            } => {
                let mut n = self.walk_expr(cond)?;
                // Each branch reasons from the same pre-branch state, and
                // anything either branch assigns is unknown afterwards.
                let before = self.known.clone();
                n += self.walk_block(then_block)?;
                self.known = before.clone();
                n += self.walk_block(else_block)?;
                self.known = before;
                let mut touched = HashSet::new();
                assigned_arrays_in_block(then_block, &mut touched);
                assigned_arrays_in_block(else_block, &mut touched);
                for name in touched {
                    self.update(&name, None);
                }
                Ok(n)
            }

            Stat::While { cond, body } => {
                // An assignment anywhere in the body kills proofs for the
                // accesses of *every* iteration, not just the statements
                // after it, so invalidate before walking. Invalidate again
                // afterwards: the body may not run at all, so a length the
                // body establishes does not hold beyond the loop.
                let mut touched = HashSet::new();
                assigned_arrays_in_block(body, &mut touched);
                for name in &touched {
                    self.update(name, None);
                }
                let mut n = self.walk_expr(cond)?;
                n += self.walk_block(body)?;
                for name in &touched {
                    self.update(name, None);
                }
                Ok(n)
            }

            Stat::For { body, .. } => {
                let mut touched = HashSet::new();
                assigned_arrays_in_block(body, &mut touched);
                for name in &touched {
                    self.update(name, None);
                }
                let n = self.walk_block(body)?;
                for name in &touched {
                    self.update(name, None);
                }
                Ok(n)
            }

            Stat::Begin(block) => self.walk_block(block),

            Stat::Call(call) => {
                let mut n = 0;
                for a in &mut call.actuals {
                    n += self.walk_expr(a)?;
                }
                Ok(n)
            }
        }
    }

    fn walk_expr(&mut self, expr: &mut Expr) -> Result<usize, OptimizationError> {
        match expr {
            Expr::IntLit(_)
            | Expr::BoolLit(_)
            | Expr::CharLit(_)
            | Expr::StrLit(_)
            | Expr::NullLit
            | Expr::Ident(_) => Ok(0),

            Expr::ArrayElem(access) => self.walk_access(access),

            Expr::PairElem(access) => self.walk_expr(&mut access.pair),

            Expr::ArrayLiteral { elems, .. } => {
                let mut n = 0;
                for e in elems {
                    n += self.walk_expr(e)?;
                }
                Ok(n)
            }

            Expr::NewPair(fst, snd) => Ok(self.walk_expr(fst)? + self.walk_expr(snd)?),

            Expr::Unary(_, sub) => self.walk_expr(sub),

            Expr::Binary(_, lhs, rhs) => Ok(self.walk_expr(lhs)? + self.walk_expr(rhs)?),

            Expr::Call(call) => {
                let mut n = 0;
                for a in &mut call.actuals {
                    n += self.walk_expr(a)?;
                }
                Ok(n)
            }
        }
    }

    fn walk_access(&mut self, access: &mut ArrayAccess) -> Result<usize, OptimizationError> {
        let mut n = 0;
        for ix in &mut access.indices {
            n += self.walk_expr(ix)?;
        }
        // Only the simple single-index case is proved; nested dimensions
        // have lengths this pass never learns.
        if let [Expr::IntLit(i)] = access.indices.as_slice() {
            if let Some(len) = self.lookup(&access.array.name) {
                if len < 0 {
                    return Err(OptimizationError::InvalidLength {
                        array: access.array.name.clone(),
                        len,
                    });
                }
                if *i >= 0 && *i < len {
                    if !access.needs_bounds_check {
                        return Err(OptimizationError::AlreadyElided {
                            array: access.array.name.clone(),
                        });
                    }
                    debug!("Eliding bounds check on {}[{}]", access.array.name, i);
                    access.needs_bounds_check = false;
                    n += 1;
                }
            }
        }
        Ok(n)
    }
}

fn literal_len(rhs: &Expr) -> Option<i32> {
    match rhs {
        Expr::ArrayLiteral { elems, .. } => Some(elems.len() as i32),
        _ => None,
    }
}

fn assigned_arrays_in_block(block: &Block, out: &mut HashSet<String>) {
    for stat in &block.statements {
        assigned_arrays(stat, out);
    }
}

/// Array variables a statement may rebind or free.
fn assigned_arrays(stat: &Stat, out: &mut HashSet<String>) {
    match stat {
        Stat::Assign {
            lhs: Lvalue::Ident(id),
            ..
        } => {
            if let Type::Array(..) = id.ty {
                out.insert(id.name.clone());
            }
        }
        Stat::Free(Expr::Ident(id)) => {
            if let Type::Array(..) = id.ty {
                out.insert(id.name.clone());
            }
        }
        Stat::If {
            then_block,
            else_block,
            ..
        } => {
            assigned_arrays_in_block(then_block, out);
            assigned_arrays_in_block(else_block, out);
        }
        Stat::While { body, .. } | Stat::For { body, .. } => {
            assigned_arrays_in_block(body, out);
        }
        Stat::Begin(block) => assigned_arrays_in_block(block, out),
        _ => (),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parsetree as pt;
    use crate::compiler::semantics::analyze;

    fn int_array_decl(name: &str, elems: Vec<i32>) -> pt::Stat {
        pt::Stat::Decl {
            ty: pt::TypeName::Array(Box::new(pt::TypeName::Int)),
            name: name.into(),
            rhs: pt::AssignRhs::ArrayLiteral(elems.into_iter().map(pt::Expr::IntLit).collect()),
        }
    }

    fn access(name: &str, index: pt::Expr) -> pt::Expr {
        pt::Expr::ArrayElem {
            name: name.into(),
            indices: vec![index],
        }
    }

    fn analyzed(body: Vec<pt::Stat>) -> Program {
        let prog = pt::Program {
            functions: vec![],
            body: pt::Stat::Seq(body),
        };
        analyze(&prog).unwrap().0
    }

    /// Collects the bounds flags of every array access in the main body,
    /// in statement order.
    fn flags(program: &Program) -> Vec<bool> {
        fn from_expr(e: &Expr, out: &mut Vec<bool>) {
            match e {
                Expr::ArrayElem(a) => {
                    for ix in &a.indices {
                        from_expr(ix, out);
                    }
                    out.push(a.needs_bounds_check);
                }
                Expr::Binary(_, l, r) => {
                    from_expr(l, out);
                    from_expr(r, out);
                }
                Expr::Unary(_, s) => from_expr(s, out),
                _ => (),
            }
        }
        fn from_block(b: &Block, out: &mut Vec<bool>) {
            for s in &b.statements {
                match s {
                    Stat::VarDecl { rhs, .. } => from_expr(rhs, out),
                    Stat::Print(e) | Stat::Println(e) | Stat::Free(e) | Stat::Exit(e) => {
                        from_expr(e, out)
                    }
                    Stat::Assign { lhs, rhs } => {
                        from_expr(rhs, out);
                        if let Lvalue::ArrayElem(a) = lhs {
                            out.push(a.needs_bounds_check);
                        }
                    }
                    Stat::If {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        from_expr(cond, out);
                        from_block(then_block, out);
                        from_block(else_block, out);
                    }
                    Stat::While { cond, body } => {
                        from_expr(cond, out);
                        from_block(body, out);
                    }
                    Stat::For { body, .. } => from_block(body, out),
                    Stat::Begin(b) => from_block(b, out),
                    _ => (),
                }
            }
        }
        let mut out = vec![];
        from_block(&program.body, &mut out);
        out
    }

    #[test]
    fn literal_index_into_literal_array_is_elided() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::Println(access("a", pt::Expr::IntLit(1))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(1));
        assert_eq!(flags(&program), vec![false]);
    }

    #[test]
    fn out_of_range_literal_index_keeps_its_check() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::Println(access("a", pt::Expr::IntLit(3))),
            pt::Stat::Println(access("a", pt::Expr::IntLit(-1))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(0));
        assert_eq!(flags(&program), vec![true, true]);
    }

    #[test]
    fn dynamic_index_keeps_its_check() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::Decl {
                ty: pt::TypeName::Int,
                name: "i".into(),
                rhs: pt::AssignRhs::Expr(pt::Expr::IntLit(0)),
            },
            pt::Stat::Println(access("a", pt::Expr::Ident("i".into()))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(0));
        assert_eq!(flags(&program), vec![true]);
    }

    #[test]
    fn reassignment_to_unknown_length_kills_the_proof() {
        // a = [1]; a[2] would trap, so the check must survive after the
        // array shrinks via reassignment from a call-free but unknown rhs.
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::Println(access("a", pt::Expr::IntLit(2))),
            pt::Stat::Assign {
                lhs: pt::AssignLhs::Ident("a".into()),
                rhs: pt::AssignRhs::ArrayLiteral(vec![pt::Expr::IntLit(9)]),
            },
            pt::Stat::Println(access("a", pt::Expr::IntLit(2))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(1));
        assert_eq!(flags(&program), vec![false, true]);
    }

    #[test]
    fn assignment_inside_loop_invalidates_the_whole_body() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::While {
                cond: pt::Expr::BoolLit(true),
                body: Box::new(pt::Stat::Seq(vec![
                    pt::Stat::Println(access("a", pt::Expr::IntLit(2))),
                    pt::Stat::Assign {
                        lhs: pt::AssignLhs::Ident("a".into()),
                        rhs: pt::AssignRhs::ArrayLiteral(vec![pt::Expr::IntLit(9)]),
                    },
                ])),
            },
        ]);
        // The access precedes the assignment textually but not dynamically.
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(0));
        assert_eq!(flags(&program), vec![true]);
    }

    #[test]
    fn branch_assignment_invalidates_after_the_if() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::If {
                cond: pt::Expr::BoolLit(true),
                then_stat: Box::new(pt::Stat::Assign {
                    lhs: pt::AssignLhs::Ident("a".into()),
                    rhs: pt::AssignRhs::ArrayLiteral(vec![pt::Expr::IntLit(9)]),
                }),
                else_stat: Box::new(pt::Stat::Println(access("a", pt::Expr::IntLit(2)))),
            },
            pt::Stat::Println(access("a", pt::Expr::IntLit(2))),
        ]);
        // The else branch may still use the pre-branch proof; the access
        // after the if may not.
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(1));
        assert_eq!(flags(&program), vec![false, true]);
    }

    #[test]
    fn shadowing_declaration_gets_its_own_proof() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1]),
            pt::Stat::Begin(Box::new(pt::Stat::Seq(vec![
                int_array_decl("a", vec![1, 2, 3]),
                pt::Stat::Println(access("a", pt::Expr::IntLit(2))),
            ]))),
            pt::Stat::Println(access("a", pt::Expr::IntLit(2))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(1));
        assert_eq!(flags(&program), vec![false, true]);
    }

    #[test]
    fn freeing_an_array_kills_the_proof() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::Free(pt::Expr::Ident("a".into())),
            pt::Stat::Println(access("a", pt::Expr::IntLit(0))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(0));
        assert_eq!(flags(&program), vec![true]);
    }

    #[test]
    fn running_the_pass_twice_is_detected() {
        let mut program = analyzed(vec![
            int_array_decl("a", vec![1, 2, 3]),
            pt::Stat::Println(access("a", pt::Expr::IntLit(1))),
        ]);
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(1));
        assert_eq!(
            eliminate_bounds_checks(&mut program),
            Err(OptimizationError::AlreadyElided { array: "a".into() })
        );
    }
}
