/*!
 Code generation: typed AST to ARM assembly.

 Each statement evaluates into a single threaded result register; binary
 operators take the next register of the pool for their right operand, so
 an expression's depth bounds its register use. The pool is r4..r11 and
 there is no spilling: a program nesting deeper than the pool fails with
 [`CodeGenError::OutOfRegisters`] instead of miscompiling.

 Stack discipline: the generator tracks a virtual stack pointer (function
 entry = 0, pushes go negative). A block reserves its scope's bytes with
 one `SUB sp` and hands slots to declarations from a running cursor;
 variable accesses compute `position - current_sp` at the use site.
 `return` rewinds everything the function allocated below the saved lr,
 however deep inside nested blocks it sits.
*/
use std::collections::HashSet;
use std::fmt;
use std::mem;

use log::debug;

use crate::compiler::arm::assembly::{
    AddressOperand, BranchLabel, CondCode, Instr, Operand, Register, StringData, RESULT_REG,
};
use crate::compiler::arm::util::{
    UtilFunction, AEABI_IDIV, AEABI_IDIVMOD, EXIT, MALLOC, PUTCHAR,
};
use crate::compiler::arm::AsmModule;
use crate::compiler::ast::ty::WORD;
use crate::compiler::ast::{
    ArrayAccess, BinaryOp, Block, Expr, FnCall, FunctionDecl, Lvalue, PairAccess, PairSide,
    Program, Stat, Type, UnaryOp,
};
use crate::compiler::semantics::symbol_table::{ScopeId, SymbolTable};

use super::state::FrameState;

/// Internal failures of code generation. These mean the program exceeded
/// a generator limitation (or the earlier phases handed over a broken
/// tree), never that the user program is semantically wrong.
#[derive(Clone, Debug, PartialEq)]
pub enum CodeGenError {
    /// The expression walker exhausted the working register pool.
    OutOfRegisters,
    /// A name survived to code generation without a stack position.
    UnboundVariable(String),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::OutOfRegisters => {
                f.write_str("expression nests too deeply: working register pool exhausted")
            }
            CodeGenError::UnboundVariable(name) => {
                write!(f, "no stack position recorded for '{}'", name)
            }
        }
    }
}

/// Generates an assembly module for an analyzed program.
pub fn generate(program: &Program, symbols: &SymbolTable) -> Result<AsmModule, CodeGenError> {
    let mut gen = AssemblyGenerator::new(symbols);
    for f in &program.functions {
        gen.gen_function(f)?;
    }
    gen.gen_main(&program.body)?;
    Ok(gen.into_module())
}

struct AssemblyGenerator<'a> {
    symbols: &'a SymbolTable,
    data: Vec<StringData>,
    util_data: Vec<StringData>,
    text: Vec<BranchLabel>,
    util_text: Vec<BranchLabel>,
    defined_utils: HashSet<UtilFunction>,
    string_count: usize,
    branch_count: usize,
    state: FrameState,
    /// Virtual stack pointer, 0 at routine entry.
    sp: i32,
    /// Allocation cursor per open block.
    cursors: Vec<i32>,
    /// Label currently receiving instructions.
    current: BranchLabel,
}

impl<'a> AssemblyGenerator<'a> {
    fn new(symbols: &'a SymbolTable) -> Self {
        AssemblyGenerator {
            symbols,
            data: vec![],
            util_data: vec![],
            text: vec![],
            util_text: vec![],
            defined_utils: HashSet::new(),
            string_count: 0,
            branch_count: 0,
            state: FrameState::new(),
            sp: 0,
            cursors: vec![],
            current: BranchLabel::new(""),
        }
    }

    fn into_module(self) -> AsmModule {
        AsmModule {
            data: self.data,
            util_data: self.util_data,
            text: self.text,
            util_text: self.util_text,
        }
    }

    fn emit(&mut self, instr: Instr) {
        self.current.add(instr);
    }

    /// Ends the current label and continues emitting under `name`.
    fn start_label(&mut self, name: String) {
        let done = mem::replace(&mut self.current, BranchLabel::new(name));
        self.text.push(done);
    }

    fn begin_routine(&mut self, name: String) {
        self.current = BranchLabel::new(name);
        self.state = FrameState::new();
        self.sp = 0;
    }

    fn end_routine(&mut self) {
        self.emit(Instr::Ltorg);
        let done = mem::replace(&mut self.current, BranchLabel::new(""));
        self.text.push(done);
    }

    fn new_string_label(&mut self) -> String {
        let name = format!("msg_{}", self.string_count);
        self.string_count += 1;
        name
    }

    fn new_branch_label(&mut self) -> String {
        let name = format!("L{}", self.branch_count);
        self.branch_count += 1;
        name
    }

    /// Emits `util` and its dependency closure, once per module.
    fn require_util(&mut self, util: UtilFunction) {
        if !self.defined_utils.insert(util) {
            return;
        }
        for dep in util.dependencies() {
            self.require_util(*dep);
        }
        debug!("Defining runtime routine {}", util.label_name());
        let (label, msgs) = util.define();
        self.util_text.push(label);
        self.util_data.extend(msgs);
    }

    fn call_util(&mut self, util: UtilFunction, cond: Option<CondCode>) {
        self.require_util(util);
        self.emit(Instr::BranchLink(cond, util.label_name().into()));
    }

    fn position_of(&self, name: &str) -> Result<i32, CodeGenError> {
        self.state
            .get(name)
            .ok_or_else(|| CodeGenError::UnboundVariable(name.into()))
    }

    /// Takes the next slot of the innermost block for a declaration.
    fn alloc_local(&mut self, name: &str, size: i32) -> i32 {
        let cursor = self.cursors.last_mut().map(|c| {
            let pos = *c;
            *c += size;
            pos
        });
        let pos = cursor.unwrap_or(self.sp);
        self.state.set(name, pos);
        pos
    }

    fn gen_function(&mut self, f: &FunctionDecl) -> Result<(), CodeGenError> {
        debug!("Generating f_{}", f.name);
        self.begin_routine(format!("f_{}", f.name));

        // The caller pushed the actuals so that the first formal sits
        // right at our entry sp, the rest above it.
        let mut pos = 0;
        for p in &f.formals {
            self.state.set(&p.name, pos);
            pos += p.ty.size();
        }

        self.emit(Instr::Push(Register::Lr));
        self.sp -= WORD;

        let locals = self.symbols.stack_size(f.body.scope);
        if locals > 0 {
            self.emit(Instr::Sub(false, Register::Sp, Register::Sp, Operand::Imm(locals)));
        }
        self.sp -= locals;

        self.cursors.push(self.sp);
        for stat in &f.body.statements {
            self.gen_stat(stat)?;
        }
        self.close_scope(f.body.scope);
        self.cursors.pop();

        self.end_routine();
        Ok(())
    }

    /// The program body becomes `main`, with a synthesized `return 0`.
    fn gen_main(&mut self, body: &Block) -> Result<(), CodeGenError> {
        debug!("Generating main");
        self.begin_routine("main".into());
        self.emit(Instr::Push(Register::Lr));
        self.sp -= WORD;

        let locals = self.symbols.stack_size(body.scope);
        if locals > 0 {
            self.emit(Instr::Sub(false, Register::Sp, Register::Sp, Operand::Imm(locals)));
        }
        self.sp -= locals;

        self.cursors.push(self.sp);
        for stat in &body.statements {
            self.gen_stat(stat)?;
        }
        self.close_scope(body.scope);
        self.cursors.pop();

        self.emit(Instr::Ldr(None, Register::R0, AddressOperand::Imm(0)));
        let unwind = -WORD - self.sp;
        if unwind > 0 {
            self.emit(Instr::Add(false, Register::Sp, Register::Sp, Operand::Imm(unwind)));
        }
        self.emit(Instr::Pop(Register::Pc));
        self.end_routine();
        Ok(())
    }

    fn close_scope(&mut self, scope: ScopeId) {
        let names: Vec<String> = self.symbols.names(scope).map(String::from).collect();
        self.state.pop_scope(names.iter().map(String::as_str));
    }

    fn gen_block(&mut self, block: &Block) -> Result<(), CodeGenError> {
        let size = self.symbols.stack_size(block.scope);
        if size > 0 {
            self.emit(Instr::Sub(false, Register::Sp, Register::Sp, Operand::Imm(size)));
        }
        self.sp -= size;
        self.cursors.push(self.sp);

        for stat in &block.statements {
            self.gen_stat(stat)?;
        }

        self.close_scope(block.scope);
        self.cursors.pop();
        self.sp += size;
        if size > 0 {
            self.emit(Instr::Add(false, Register::Sp, Register::Sp, Operand::Imm(size)));
        }
        Ok(())
    }

    fn gen_stat(&mut self, stat: &Stat) -> Result<(), CodeGenError> {
        let reg = RESULT_REG;
        match stat {
            Stat::Skip => Ok(()),

            Stat::VarDecl { name, ty, rhs, .. } => {
                self.gen_expr(rhs, reg)?;
                let size = ty.size();
                let pos = self.alloc_local(name, size);
                let off = pos - self.sp;
                self.emit(store_instr(size, reg, AddressOperand::Offset(Register::Sp, off)));
                Ok(())
            }

            Stat::Assign { lhs, rhs } => {
                self.gen_expr(rhs, reg)?;
                match lhs {
                    Lvalue::Ident(id) => {
                        let off = self.position_of(&id.name)? - self.sp;
                        self.emit(store_instr(
                            id.ty.size(),
                            reg,
                            AddressOperand::Offset(Register::Sp, off),
                        ));
                    }
                    Lvalue::ArrayElem(access) => {
                        let addr = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
                        self.gen_array_elem_addr(access, addr)?;
                        self.emit(store_instr(
                            access.elem_type.size(),
                            reg,
                            AddressOperand::Zero(addr),
                        ));
                    }
                    Lvalue::PairElem(access) => {
                        let addr = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
                        self.gen_pair_elem_addr(access, addr)?;
                        self.emit(store_instr(
                            access.elem_type.size(),
                            reg,
                            AddressOperand::Zero(addr),
                        ));
                    }
                }
                Ok(())
            }

            Stat::Read(lhs) => {
                let ty = lhs.ty();
                match lhs {
                    Lvalue::Ident(id) => {
                        let off = self.position_of(&id.name)? - self.sp;
                        self.emit(Instr::Add(false, reg, Register::Sp, Operand::Imm(off)));
                    }
                    Lvalue::ArrayElem(access) => self.gen_array_elem_addr(access, reg)?,
                    Lvalue::PairElem(access) => self.gen_pair_elem_addr(access, reg)?,
                }
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
                match ty {
                    Type::Char => self.call_util(UtilFunction::ReadChar, None),
                    _ => self.call_util(UtilFunction::ReadInt, None),
                }
                Ok(())
            }

            Stat::Free(e) => {
                self.gen_expr(e, reg)?;
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
                match e.ty() {
                    Type::Pair(..) => self.call_util(UtilFunction::FreePair, None),
                    _ => self.call_util(UtilFunction::FreePointer, None),
                }
                Ok(())
            }

            Stat::Return(e) => {
                self.gen_expr(e, reg)?;
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
                // Unwind every allocation below the saved lr, including
                // enclosing blocks this return jumps out of.
                let unwind = -WORD - self.sp;
                if unwind > 0 {
                    self.emit(Instr::Add(false, Register::Sp, Register::Sp, Operand::Imm(unwind)));
                }
                self.emit(Instr::Pop(Register::Pc));
                Ok(())
            }

            Stat::Exit(e) => {
                self.gen_expr(e, reg)?;
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
                self.emit(Instr::BranchLink(None, EXIT.into()));
                Ok(())
            }

            Stat::Print(e) => {
                self.gen_expr(e, reg)?;
                self.gen_print(e.ty(), reg);
                Ok(())
            }

            Stat::Println(e) => {
                self.gen_expr(e, reg)?;
                self.gen_print(e.ty(), reg);
                self.call_util(UtilFunction::PrintLn, None);
                Ok(())
            }

            Stat::If {
                cond,
                then_block,
                else_block,
            } => {
                let else_label = self.new_branch_label();
                let fi_label = self.new_branch_label();
                self.gen_expr(cond, reg)?;
                self.emit(Instr::Cmp(reg, Operand::Imm(0)));
                self.emit(Instr::Branch(Some(CondCode::Eq), else_label.clone()));
                self.gen_block(then_block)?;
                self.emit(Instr::Branch(None, fi_label.clone()));
                self.start_label(else_label);
                self.gen_block(else_block)?;
                self.start_label(fi_label);
                Ok(())
            }

            Stat::While { cond, body } => {
                let cond_label = self.new_branch_label();
                let body_label = self.new_branch_label();
                self.emit(Instr::Branch(None, cond_label.clone()));
                self.start_label(body_label.clone());
                self.gen_block(body)?;
                self.start_label(cond_label);
                self.gen_expr(cond, reg)?;
                self.emit(Instr::Cmp(reg, Operand::Imm(1)));
                self.emit(Instr::Branch(Some(CondCode::Eq), body_label));
                Ok(())
            }

            Stat::For {
                counter,
                bound,
                body,
            } => self.gen_for(counter.name.as_str(), *bound, body, reg),

            Stat::Begin(block) => self.gen_block(block),

            Stat::Call(call) => self.gen_call(call, reg),
        }
    }

    /// `for i < bound` lowers to a counted while loop whose counter lives
    /// in the body's scope.
    fn gen_for(
        &mut self,
        counter: &str,
        bound: i32,
        body: &Block,
        reg: Register,
    ) -> Result<(), CodeGenError> {
        let size = self.symbols.stack_size(body.scope);
        if size > 0 {
            self.emit(Instr::Sub(false, Register::Sp, Register::Sp, Operand::Imm(size)));
        }
        self.sp -= size;
        self.cursors.push(self.sp);

        self.emit(Instr::Ldr(None, reg, AddressOperand::Imm(0)));
        let pos = self.alloc_local(counter, WORD);
        let off = pos - self.sp;
        self.emit(Instr::Str(reg, AddressOperand::Offset(Register::Sp, off)));

        let cond_label = self.new_branch_label();
        let body_label = self.new_branch_label();
        self.emit(Instr::Branch(None, cond_label.clone()));
        self.start_label(body_label.clone());

        for stat in &body.statements {
            self.gen_stat(stat)?;
        }

        // Increment; the bound is a literal no bigger than i32::MAX, so
        // the counter cannot overflow before the comparison stops it.
        let counter_off = self.position_of(counter)? - self.sp;
        self.emit(Instr::Ldr(
            None,
            reg,
            AddressOperand::Offset(Register::Sp, counter_off),
        ));
        self.emit(Instr::Add(false, reg, reg, Operand::Imm(1)));
        self.emit(Instr::Str(reg, AddressOperand::Offset(Register::Sp, counter_off)));

        self.start_label(cond_label);
        let bound_reg = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
        self.emit(Instr::Ldr(
            None,
            reg,
            AddressOperand::Offset(Register::Sp, counter_off),
        ));
        self.emit(Instr::Ldr(None, bound_reg, AddressOperand::Imm(bound)));
        self.emit(Instr::Cmp(reg, Operand::Reg(bound_reg)));
        self.emit(Instr::Branch(Some(CondCode::Lt), body_label));

        self.close_scope(body.scope);
        self.cursors.pop();
        self.sp += size;
        if size > 0 {
            self.emit(Instr::Add(false, Register::Sp, Register::Sp, Operand::Imm(size)));
        }
        Ok(())
    }

    fn gen_print(&mut self, ty: Type, reg: Register) {
        self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
        match ty {
            Type::Int => self.call_util(UtilFunction::PrintInt, None),
            Type::Bool => self.call_util(UtilFunction::PrintBool, None),
            Type::Char => self.emit(Instr::BranchLink(None, PUTCHAR.into())),
            Type::String => self.call_util(UtilFunction::PrintString, None),
            _ => self.call_util(UtilFunction::PrintReference, None),
        }
    }

    /// Pushes the actuals in reverse declaration order so the first formal
    /// lands at the callee's entry sp, calls, reclaims, and moves r0 into
    /// the caller's result register.
    fn gen_call(&mut self, call: &FnCall, reg: Register) -> Result<(), CodeGenError> {
        let mut pushed = 0;
        for actual in call.actuals.iter().rev() {
            self.gen_expr(actual, reg)?;
            let size = actual.ty().size();
            self.emit(store_instr(
                size,
                reg,
                AddressOperand::PreIndexed(Register::Sp, -size),
            ));
            self.sp -= size;
            pushed += size;
        }
        self.emit(Instr::BranchLink(None, format!("f_{}", call.name)));
        if pushed > 0 {
            self.emit(Instr::Add(false, Register::Sp, Register::Sp, Operand::Imm(pushed)));
        }
        self.sp += pushed;
        self.emit(Instr::Mov(None, reg, Operand::Reg(Register::R0)));
        Ok(())
    }

    fn gen_expr(&mut self, expr: &Expr, reg: Register) -> Result<(), CodeGenError> {
        match expr {
            Expr::IntLit(i) => {
                self.emit(Instr::Ldr(None, reg, AddressOperand::Imm(*i)));
                Ok(())
            }
            Expr::BoolLit(b) => {
                self.emit(Instr::Mov(None, reg, Operand::Imm(*b as i32)));
                Ok(())
            }
            Expr::CharLit(c) => {
                self.emit(Instr::Mov(None, reg, Operand::Chr(*c)));
                Ok(())
            }
            Expr::StrLit(s) => {
                let label = self.new_string_label();
                self.data.push(StringData::new(label.clone(), s.clone()));
                self.emit(Instr::Ldr(None, reg, AddressOperand::Label(label)));
                Ok(())
            }
            Expr::NullLit => {
                self.emit(Instr::Ldr(None, reg, AddressOperand::Imm(0)));
                Ok(())
            }

            Expr::Ident(id) => {
                let off = self.position_of(&id.name)? - self.sp;
                self.emit(load_instr(
                    id.ty.size(),
                    reg,
                    AddressOperand::Offset(Register::Sp, off),
                ));
                Ok(())
            }

            Expr::ArrayElem(access) => {
                self.gen_array_elem_addr(access, reg)?;
                self.emit(load_instr(
                    access.elem_type.size(),
                    reg,
                    AddressOperand::Zero(reg),
                ));
                Ok(())
            }

            Expr::PairElem(access) => {
                self.gen_pair_elem_addr(access, reg)?;
                self.emit(load_instr(
                    access.elem_type.size(),
                    reg,
                    AddressOperand::Zero(reg),
                ));
                Ok(())
            }

            Expr::ArrayLiteral { elem_type, elems } => {
                let elem_size = elem_type.size();
                let total = WORD + elem_size * elems.len() as i32;
                self.emit(Instr::Ldr(None, Register::R0, AddressOperand::Imm(total)));
                self.emit(Instr::BranchLink(None, MALLOC.into()));
                self.emit(Instr::Mov(None, reg, Operand::Reg(Register::R0)));
                let elem_reg = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
                for (i, e) in elems.iter().enumerate() {
                    self.gen_expr(e, elem_reg)?;
                    self.emit(store_instr(
                        elem_size,
                        elem_reg,
                        AddressOperand::Offset(reg, WORD + elem_size * i as i32),
                    ));
                }
                self.emit(Instr::Ldr(
                    None,
                    elem_reg,
                    AddressOperand::Imm(elems.len() as i32),
                ));
                self.emit(Instr::Str(elem_reg, AddressOperand::Zero(reg)));
                Ok(())
            }

            Expr::NewPair(fst, snd) => {
                self.emit(Instr::Ldr(None, Register::R0, AddressOperand::Imm(2 * WORD)));
                self.emit(Instr::BranchLink(None, MALLOC.into()));
                self.emit(Instr::Mov(None, reg, Operand::Reg(Register::R0)));
                let val_reg = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
                for (slot, elem) in [fst, snd].iter().enumerate() {
                    self.gen_expr(elem, val_reg)?;
                    let size = elem.ty().size();
                    self.emit(Instr::Ldr(None, Register::R0, AddressOperand::Imm(size)));
                    self.emit(Instr::BranchLink(None, MALLOC.into()));
                    self.emit(store_instr(size, val_reg, AddressOperand::Zero(Register::R0)));
                    self.emit(Instr::Str(
                        Register::R0,
                        AddressOperand::Offset(reg, slot as i32 * WORD),
                    ));
                }
                Ok(())
            }

            Expr::Unary(op, sub) => {
                self.gen_expr(sub, reg)?;
                match op {
                    UnaryOp::Not => {
                        self.emit(Instr::Eor(reg, reg, Operand::Imm(1)));
                    }
                    UnaryOp::Neg => {
                        self.emit(Instr::Rsbs(reg, reg, Operand::Imm(0)));
                        self.require_util(UtilFunction::ThrowOverflowError);
                        self.emit(Instr::BranchLink(
                            Some(CondCode::Vs),
                            UtilFunction::ThrowOverflowError.label_name().into(),
                        ));
                    }
                    UnaryOp::Len => {
                        self.emit(Instr::Ldr(None, reg, AddressOperand::Zero(reg)));
                    }
                    // ord and chr are reinterpretations; the value is
                    // already what the result needs to be.
                    UnaryOp::Ord | UnaryOp::Chr => (),
                }
                Ok(())
            }

            Expr::Binary(op, lhs, rhs) => {
                self.gen_expr(lhs, reg)?;
                let rhs_reg = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
                self.gen_expr(rhs, rhs_reg)?;
                self.gen_binary_op(*op, reg, rhs_reg);
                Ok(())
            }

            Expr::Call(call) => self.gen_call(call, reg),
        }
    }

    fn gen_binary_op(&mut self, op: BinaryOp, reg: Register, rhs_reg: Register) {
        use CondCode::*;
        match op {
            BinaryOp::Add => {
                self.emit(Instr::Add(true, reg, reg, Operand::Reg(rhs_reg)));
                self.require_util(UtilFunction::ThrowOverflowError);
                self.emit(Instr::BranchLink(
                    Some(Vs),
                    UtilFunction::ThrowOverflowError.label_name().into(),
                ));
            }
            BinaryOp::Sub => {
                self.emit(Instr::Sub(true, reg, reg, Operand::Reg(rhs_reg)));
                self.require_util(UtilFunction::ThrowOverflowError);
                self.emit(Instr::BranchLink(
                    Some(Vs),
                    UtilFunction::ThrowOverflowError.label_name().into(),
                ));
            }
            BinaryOp::Mult => {
                // The high word must equal the sign extension of the low
                // word, or the product overflowed 32 bits.
                self.emit(Instr::Smull(reg, rhs_reg, reg, rhs_reg));
                self.emit(Instr::Cmp(rhs_reg, Operand::Asr(reg, 31)));
                self.require_util(UtilFunction::ThrowOverflowError);
                self.emit(Instr::BranchLink(
                    Some(Ne),
                    UtilFunction::ThrowOverflowError.label_name().into(),
                ));
            }
            BinaryOp::Div => {
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
                self.emit(Instr::Mov(None, Register::R1, Operand::Reg(rhs_reg)));
                self.call_util(UtilFunction::CheckDivideByZero, None);
                self.emit(Instr::BranchLink(None, AEABI_IDIV.into()));
                self.emit(Instr::Mov(None, reg, Operand::Reg(Register::R0)));
            }
            BinaryOp::Mod => {
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
                self.emit(Instr::Mov(None, Register::R1, Operand::Reg(rhs_reg)));
                self.call_util(UtilFunction::CheckDivideByZero, None);
                self.emit(Instr::BranchLink(None, AEABI_IDIVMOD.into()));
                self.emit(Instr::Mov(None, reg, Operand::Reg(Register::R1)));
            }
            BinaryOp::Gt => self.gen_compare(Gt, reg, rhs_reg),
            BinaryOp::Gte => self.gen_compare(Ge, reg, rhs_reg),
            BinaryOp::Lt => self.gen_compare(Lt, reg, rhs_reg),
            BinaryOp::Lte => self.gen_compare(Le, reg, rhs_reg),
            BinaryOp::Equals => self.gen_compare(Eq, reg, rhs_reg),
            BinaryOp::NotEquals => self.gen_compare(Ne, reg, rhs_reg),
            BinaryOp::And => self.emit(Instr::And(reg, reg, Operand::Reg(rhs_reg))),
            BinaryOp::Or => self.emit(Instr::Orr(reg, reg, Operand::Reg(rhs_reg))),
        }
    }

    fn gen_compare(&mut self, cc: CondCode, reg: Register, rhs_reg: Register) {
        self.emit(Instr::Cmp(reg, Operand::Reg(rhs_reg)));
        self.emit(Instr::Mov(Some(cc), reg, Operand::Imm(1)));
        self.emit(Instr::Mov(Some(cc.negate()), reg, Operand::Imm(0)));
    }

    /// Leaves the address of the accessed element in `reg`; the register
    /// after it evaluates the indices.
    fn gen_array_elem_addr(
        &mut self,
        access: &ArrayAccess,
        reg: Register,
    ) -> Result<(), CodeGenError> {
        let idx_reg = reg.next().ok_or(CodeGenError::OutOfRegisters)?;
        let off = self.position_of(&access.array.name)? - self.sp;
        self.emit(Instr::Add(false, reg, Register::Sp, Operand::Imm(off)));

        let last = access.indices.len() - 1;
        for (i, ix) in access.indices.iter().enumerate() {
            self.gen_expr(ix, idx_reg)?;
            self.emit(Instr::Ldr(None, reg, AddressOperand::Zero(reg)));
            if access.needs_bounds_check {
                self.emit(Instr::Mov(None, Register::R0, Operand::Reg(idx_reg)));
                self.emit(Instr::Mov(None, Register::R1, Operand::Reg(reg)));
                self.call_util(UtilFunction::CheckArrayBounds, None);
            }
            self.emit(Instr::Add(false, reg, reg, Operand::Imm(WORD)));
            let elem_size = if i == last {
                access.elem_type.size()
            } else {
                WORD
            };
            if elem_size == 1 {
                self.emit(Instr::Add(false, reg, reg, Operand::Reg(idx_reg)));
            } else {
                self.emit(Instr::Add(false, reg, reg, Operand::Lsl(idx_reg, 2)));
            }
        }
        Ok(())
    }

    /// Evaluates the pair expression, checks it for null, and leaves the
    /// address of the requested element cell in `reg`.
    fn gen_pair_elem_addr(
        &mut self,
        access: &PairAccess,
        reg: Register,
    ) -> Result<(), CodeGenError> {
        self.gen_expr(&access.pair, reg)?;
        self.emit(Instr::Mov(None, Register::R0, Operand::Reg(reg)));
        self.call_util(UtilFunction::CheckNullPointer, None);
        let slot = match access.side {
            PairSide::Fst => 0,
            PairSide::Snd => WORD,
        };
        self.emit(Instr::Ldr(None, reg, AddressOperand::Offset(reg, slot)));
        Ok(())
    }
}

fn load_instr(size: i32, reg: Register, addr: AddressOperand) -> Instr {
    if size == 1 {
        Instr::Ldrsb(None, reg, addr)
    } else {
        Instr::Ldr(None, reg, addr)
    }
}

fn store_instr(size: i32, reg: Register, addr: AddressOperand) -> Instr {
    if size == 1 {
        Instr::Strb(reg, addr)
    } else {
        Instr::Str(reg, addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::optimizer::eliminate_bounds_checks;
    use crate::compiler::parsetree as pt;
    use crate::compiler::semantics::analyze;

    fn compile_body(body: Vec<pt::Stat>) -> String {
        compile_tree(pt::Program {
            functions: vec![],
            body: pt::Stat::Seq(body),
        })
    }

    fn compile_tree(tree: pt::Program) -> String {
        let (program, symbols) = analyze(&tree).unwrap();
        generate(&program, &symbols).unwrap().render()
    }

    #[test]
    fn exit_status_flows_through_r0() {
        let out = compile_body(vec![pt::Stat::Exit(pt::Expr::IntLit(42))]);
        assert!(out.contains("main:"));
        assert!(out.contains("LDR r4, =42"));
        assert!(out.contains("MOV r0, r4"));
        assert!(out.contains("BL exit"));
    }

    #[test]
    fn main_returns_zero_without_an_explicit_return() {
        let out = compile_body(vec![pt::Stat::Skip]);
        assert!(out.contains("main:\n\tPUSH {lr}\n\tLDR r0, =0\n\tPOP {pc}\n\t.ltorg\n"));
    }

    #[test]
    fn string_literal_lands_in_the_data_section() {
        let out = compile_body(vec![pt::Stat::Println(pt::Expr::StrLit(
            "hello, world!".into(),
        ))]);
        assert!(out.starts_with(".data\n"));
        assert!(out.contains("msg_0:\n\t.word 13\n\t.ascii\t\"hello, world!\"\n"));
        assert!(out.contains("LDR r4, =msg_0"));
        assert!(out.contains("BL p_print_string"));
        assert!(out.contains("BL p_print_ln"));
        // The print routine's own format string is emitted too.
        assert!(out.contains("p_print_string_msg_0:"));
    }

    #[test]
    fn division_is_guarded_and_the_guard_is_emitted_once() {
        let div = |lhs, rhs| {
            pt::Stat::Decl {
                ty: pt::TypeName::Int,
                name: "q".into(),
                rhs: pt::AssignRhs::Expr(pt::Expr::Binary(
                    pt::BinaryOp::Div,
                    Box::new(pt::Expr::IntLit(lhs)),
                    Box::new(pt::Expr::IntLit(rhs)),
                )),
            }
        };
        let other = pt::Stat::Decl {
            ty: pt::TypeName::Int,
            name: "r".into(),
            rhs: pt::AssignRhs::Expr(pt::Expr::Binary(
                pt::BinaryOp::Mod,
                Box::new(pt::Expr::IntLit(7)),
                Box::new(pt::Expr::IntLit(3)),
            )),
        };
        let out = compile_body(vec![div(10, 2), other]);
        assert!(out.contains("BL p_check_divide_by_zero"));
        assert!(out.contains("BL __aeabi_idiv"));
        assert!(out.contains("BL __aeabi_idivmod"));
        // One definition, no matter how many call sites.
        assert_eq!(out.matches("p_check_divide_by_zero:").count(), 1);
        // Its dependency closure came with it.
        assert_eq!(out.matches("p_throw_runtime_error:").count(), 1);
        assert_eq!(out.matches("p_print_string:").count(), 1);
    }

    #[test]
    fn addition_checks_for_overflow() {
        let out = compile_body(vec![pt::Stat::Decl {
            ty: pt::TypeName::Int,
            name: "x".into(),
            rhs: pt::AssignRhs::Expr(pt::Expr::Binary(
                pt::BinaryOp::Add,
                Box::new(pt::Expr::IntLit(1)),
                Box::new(pt::Expr::IntLit(2)),
            )),
        }]);
        assert!(out.contains("ADDS r4, r4, r5"));
        assert!(out.contains("BLVS p_throw_overflow_error"));
    }

    #[test]
    fn multiplication_checks_the_high_word() {
        let out = compile_body(vec![pt::Stat::Decl {
            ty: pt::TypeName::Int,
            name: "x".into(),
            rhs: pt::AssignRhs::Expr(pt::Expr::Binary(
                pt::BinaryOp::Mult,
                Box::new(pt::Expr::IntLit(3)),
                Box::new(pt::Expr::IntLit(4)),
            )),
        }]);
        assert!(out.contains("SMULL r4, r5, r4, r5"));
        assert!(out.contains("CMP r5, r4, ASR #31"));
        assert!(out.contains("BLNE p_throw_overflow_error"));
    }

    fn indexed_print() -> pt::Program {
        pt::Program {
            functions: vec![],
            body: pt::Stat::Seq(vec![
                pt::Stat::Decl {
                    ty: pt::TypeName::Array(Box::new(pt::TypeName::Int)),
                    name: "a".into(),
                    rhs: pt::AssignRhs::ArrayLiteral(vec![
                        pt::Expr::IntLit(1),
                        pt::Expr::IntLit(2),
                    ]),
                },
                pt::Stat::Println(pt::Expr::ArrayElem {
                    name: "a".into(),
                    indices: vec![pt::Expr::IntLit(0)],
                }),
            ]),
        }
    }

    #[test]
    fn array_access_calls_the_bounds_check() {
        let out = compile_tree(indexed_print());
        assert!(out.contains("BL p_check_array_bounds"));
        assert_eq!(out.matches("p_check_array_bounds:").count(), 1);
    }

    #[test]
    fn elided_access_skips_the_bounds_check() {
        let (mut program, symbols) = analyze(&indexed_print()).unwrap();
        assert_eq!(eliminate_bounds_checks(&mut program), Ok(1));
        let out = generate(&program, &symbols).unwrap().render();
        assert!(!out.contains("p_check_array_bounds"));
    }

    #[test]
    fn pair_element_read_checks_for_null() {
        let out = compile_body(vec![
            pt::Stat::Decl {
                ty: pt::TypeName::Pair(Box::new(pt::TypeName::Int), Box::new(pt::TypeName::Int)),
                name: "p".into(),
                rhs: pt::AssignRhs::NewPair(pt::Expr::IntLit(1), pt::Expr::IntLit(2)),
            },
            pt::Stat::Decl {
                ty: pt::TypeName::Int,
                name: "x".into(),
                rhs: pt::AssignRhs::PairElem {
                    side: pt::PairSide::Fst,
                    pair: pt::Expr::Ident("p".into()),
                },
            },
        ]);
        assert!(out.contains("BL malloc"));
        assert!(out.contains("BL p_check_null_pointer"));
    }

    #[test]
    fn while_loop_tests_the_condition_at_the_bottom() {
        let out = compile_body(vec![pt::Stat::While {
            cond: pt::Expr::BoolLit(true),
            body: Box::new(pt::Stat::Skip),
        }]);
        assert!(out.contains("B L0"));
        assert!(out.contains("L1:"));
        assert!(out.contains("L0:\n\tMOV r4, #1\n\tCMP r4, #1\n\tBEQ L1"));
    }

    #[test]
    fn function_call_pushes_arguments_and_reclaims() {
        let tree = pt::Program {
            functions: vec![pt::Function {
                name: "inc".into(),
                return_type: pt::TypeName::Int,
                params: vec![pt::Param {
                    name: "n".into(),
                    ty: pt::TypeName::Int,
                }],
                body: pt::Stat::Return(pt::Expr::Binary(
                    pt::BinaryOp::Add,
                    Box::new(pt::Expr::Ident("n".into())),
                    Box::new(pt::Expr::IntLit(1)),
                )),
            }],
            body: pt::Stat::Decl {
                ty: pt::TypeName::Int,
                name: "x".into(),
                rhs: pt::AssignRhs::Call {
                    name: "inc".into(),
                    args: vec![pt::Expr::IntLit(41)],
                },
            },
        };
        let out = compile_tree(tree);
        assert!(out.contains("f_inc:"));
        assert!(out.contains("STR r4, [sp, #-4]!"));
        assert!(out.contains("BL f_inc"));
        assert!(out.contains("ADD sp, sp, #4"));
        // The parameter is read from above the saved lr.
        assert!(out.contains("LDR r4, [sp, #4]"));
        assert!(out.contains("POP {pc}"));
    }

    #[test]
    fn bool_declaration_uses_byte_stores() {
        let out = compile_body(vec![pt::Stat::Decl {
            ty: pt::TypeName::Bool,
            name: "b".into(),
            rhs: pt::AssignRhs::Expr(pt::Expr::BoolLit(true)),
        }]);
        assert!(out.contains("SUB sp, sp, #1"));
        assert!(out.contains("MOV r4, #1"));
        assert!(out.contains("STRB r4, [sp]"));
        assert!(out.contains("ADD sp, sp, #1"));
    }

    #[test]
    fn deeply_nested_expressions_exhaust_the_pool() {
        // Build a right-leaning addition deep enough to need more than
        // eight working registers.
        let mut e = pt::Expr::IntLit(0);
        for i in 0..10 {
            e = pt::Expr::Binary(
                pt::BinaryOp::Add,
                Box::new(pt::Expr::IntLit(i)),
                Box::new(e),
            );
        }
        let tree = pt::Program {
            functions: vec![],
            body: pt::Stat::Exit(e),
        };
        let (program, symbols) = analyze(&tree).unwrap();
        assert_eq!(
            generate(&program, &symbols),
            Err(CodeGenError::OutOfRegisters)
        );
    }
}
