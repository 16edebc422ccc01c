/*!
 Shared runtime routines linked into every program that needs them.

 Each routine is one `UtilFunction` variant; `define` produces its label
 and message data, and `dependencies` names the routines it branches to.
 The generator emits a routine (plus its dependency closure) the first
 time something references it and never again.
*/
use super::assembly::{AddressOperand, BranchLabel, CondCode, Instr, Operand, Register, StringData};

// C library symbols the generated code links against.
pub const MALLOC: &str = "malloc";
pub const FREE: &str = "free";
pub const EXIT: &str = "exit";
pub const PRINTF: &str = "printf";
pub const FFLUSH: &str = "fflush";
pub const PUTS: &str = "puts";
pub const SCANF: &str = "scanf";
pub const PUTCHAR: &str = "putchar";
pub const AEABI_IDIV: &str = "__aeabi_idiv";
pub const AEABI_IDIVMOD: &str = "__aeabi_idivmod";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UtilFunction {
    PrintString,
    PrintLn,
    PrintInt,
    PrintBool,
    PrintReference,
    ReadInt,
    ReadChar,
    ThrowRuntimeError,
    ThrowOverflowError,
    CheckDivideByZero,
    CheckArrayBounds,
    CheckNullPointer,
    FreePair,
    FreePointer,
}

impl UtilFunction {
    pub fn label_name(self) -> &'static str {
        use UtilFunction::*;
        match self {
            PrintString => "p_print_string",
            PrintLn => "p_print_ln",
            PrintInt => "p_print_int",
            PrintBool => "p_print_bool",
            PrintReference => "p_print_reference",
            ReadInt => "p_read_int",
            ReadChar => "p_read_char",
            ThrowRuntimeError => "p_throw_runtime_error",
            ThrowOverflowError => "p_throw_overflow_error",
            CheckDivideByZero => "p_check_divide_by_zero",
            CheckArrayBounds => "p_check_array_bounds",
            CheckNullPointer => "p_check_null_pointer",
            FreePair => "p_free_pair",
            FreePointer => "p_free_pointer",
        }
    }

    /// Routines this one branches to; the emitter defines these first.
    pub fn dependencies(self) -> &'static [UtilFunction] {
        use UtilFunction::*;
        match self {
            ThrowRuntimeError => &[PrintString],
            ThrowOverflowError
            | CheckDivideByZero
            | CheckArrayBounds
            | CheckNullPointer
            | FreePair
            | FreePointer => &[ThrowRuntimeError],
            _ => &[],
        }
    }

    /// Builds the routine's code and its message data. Message labels are
    /// namespaced by the routine so two routines never collide.
    pub fn define(self) -> (BranchLabel, Vec<StringData>) {
        use CondCode::*;
        use Instr::*;
        use Register::*;
        use UtilFunction::*;

        let mut msgs = MsgPool::new(self.label_name());
        let mut label = BranchLabel::new(self.label_name());

        match self {
            PrintString => {
                let fmt = msgs.terminated("%.*s");
                label.extend(vec![
                    Push(Lr),
                    Ldr(None, R1, AddressOperand::Zero(R0)),
                    Add(false, R2, R0, Operand::Imm(4)),
                    Ldr(None, R0, AddressOperand::Label(fmt)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, PRINTF.into()),
                    Mov(None, R0, Operand::Imm(0)),
                    BranchLink(None, FFLUSH.into()),
                    Pop(Pc),
                ]);
            }
            PrintLn => {
                let empty = msgs.terminated("");
                label.extend(vec![
                    Push(Lr),
                    Ldr(None, R0, AddressOperand::Label(empty)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, PUTS.into()),
                    Mov(None, R0, Operand::Imm(0)),
                    BranchLink(None, FFLUSH.into()),
                    Pop(Pc),
                ]);
            }
            PrintInt => {
                let fmt = msgs.terminated("%d");
                label.extend(vec![
                    Push(Lr),
                    Mov(None, R1, Operand::Reg(R0)),
                    Ldr(None, R0, AddressOperand::Label(fmt)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, PRINTF.into()),
                    Mov(None, R0, Operand::Imm(0)),
                    BranchLink(None, FFLUSH.into()),
                    Pop(Pc),
                ]);
            }
            PrintBool => {
                let yes = msgs.terminated("true");
                let no = msgs.terminated("false");
                label.extend(vec![
                    Push(Lr),
                    Cmp(R0, Operand::Imm(0)),
                    Ldr(Some(Ne), R0, AddressOperand::Label(yes)),
                    Ldr(Some(Eq), R0, AddressOperand::Label(no)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, PRINTF.into()),
                    Mov(None, R0, Operand::Imm(0)),
                    BranchLink(None, FFLUSH.into()),
                    Pop(Pc),
                ]);
            }
            PrintReference => {
                let fmt = msgs.terminated("%p");
                label.extend(vec![
                    Push(Lr),
                    Mov(None, R1, Operand::Reg(R0)),
                    Ldr(None, R0, AddressOperand::Label(fmt)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, PRINTF.into()),
                    Mov(None, R0, Operand::Imm(0)),
                    BranchLink(None, FFLUSH.into()),
                    Pop(Pc),
                ]);
            }
            ReadInt => {
                let fmt = msgs.terminated("%d");
                label.extend(vec![
                    Push(Lr),
                    Mov(None, R1, Operand::Reg(R0)),
                    Ldr(None, R0, AddressOperand::Label(fmt)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, SCANF.into()),
                    Pop(Pc),
                ]);
            }
            ReadChar => {
                let fmt = msgs.terminated(" %c");
                label.extend(vec![
                    Push(Lr),
                    Mov(None, R1, Operand::Reg(R0)),
                    Ldr(None, R0, AddressOperand::Label(fmt)),
                    Add(false, R0, R0, Operand::Imm(4)),
                    BranchLink(None, SCANF.into()),
                    Pop(Pc),
                ]);
            }
            ThrowRuntimeError => {
                label.extend(vec![
                    BranchLink(None, PrintString.label_name().into()),
                    Mov(None, R0, Operand::Imm(-1)),
                    BranchLink(None, EXIT.into()),
                ]);
            }
            ThrowOverflowError => {
                let msg = msgs.terminated(
                    "OverflowError: the result is too small/large to store in a 4-byte signed-integer.\n",
                );
                label.extend(vec![
                    Ldr(None, R0, AddressOperand::Label(msg)),
                    BranchLink(None, ThrowRuntimeError.label_name().into()),
                ]);
            }
            CheckDivideByZero => {
                let msg = msgs.terminated("DivideByZeroError: divide or modulo by zero\n");
                label.extend(vec![
                    Push(Lr),
                    Cmp(R1, Operand::Imm(0)),
                    Ldr(Some(Eq), R0, AddressOperand::Label(msg)),
                    BranchLink(Some(Eq), ThrowRuntimeError.label_name().into()),
                    Pop(Pc),
                ]);
            }
            CheckArrayBounds => {
                let negative = msgs.terminated("ArrayIndexOutOfBoundsError: negative index\n");
                let too_large = msgs.terminated("ArrayIndexOutOfBoundsError: index too large\n");
                label.extend(vec![
                    Push(Lr),
                    Cmp(R0, Operand::Imm(0)),
                    Ldr(Some(Lt), R0, AddressOperand::Label(negative)),
                    BranchLink(Some(Lt), ThrowRuntimeError.label_name().into()),
                    Ldr(None, R1, AddressOperand::Zero(R1)),
                    Cmp(R0, Operand::Reg(R1)),
                    Ldr(Some(Cs), R0, AddressOperand::Label(too_large)),
                    BranchLink(Some(Cs), ThrowRuntimeError.label_name().into()),
                    Pop(Pc),
                ]);
            }
            CheckNullPointer => {
                let msg = msgs.terminated("NullReferenceError: dereference a null reference\n");
                label.extend(vec![
                    Push(Lr),
                    Cmp(R0, Operand::Imm(0)),
                    Ldr(Some(Eq), R0, AddressOperand::Label(msg)),
                    BranchLink(Some(Eq), ThrowRuntimeError.label_name().into()),
                    Pop(Pc),
                ]);
            }
            FreePair => {
                let msg = msgs.terminated("NullReferenceError: dereference a null reference\n");
                label.extend(vec![
                    Push(Lr),
                    Cmp(R0, Operand::Imm(0)),
                    Ldr(Some(Eq), R0, AddressOperand::Label(msg)),
                    Branch(Some(Eq), ThrowRuntimeError.label_name().into()),
                    Push(R0),
                    Ldr(None, R0, AddressOperand::Zero(R0)),
                    BranchLink(None, FREE.into()),
                    Ldr(None, R0, AddressOperand::Offset(Sp, 0)),
                    Ldr(None, R0, AddressOperand::Offset(R0, 4)),
                    BranchLink(None, FREE.into()),
                    Pop(R0),
                    BranchLink(None, FREE.into()),
                    Pop(Pc),
                ]);
            }
            FreePointer => {
                let msg = msgs.terminated("NullReferenceError: dereference a null reference\n");
                label.extend(vec![
                    Push(Lr),
                    Cmp(R0, Operand::Imm(0)),
                    Ldr(Some(Eq), R0, AddressOperand::Label(msg)),
                    Branch(Some(Eq), ThrowRuntimeError.label_name().into()),
                    BranchLink(None, FREE.into()),
                    Pop(Pc),
                ]);
            }
        }

        (label, msgs.into_data())
    }
}

/// Numbers and collects a routine's message strings.
struct MsgPool {
    prefix: &'static str,
    data: Vec<StringData>,
}

impl MsgPool {
    fn new(prefix: &'static str) -> Self {
        MsgPool {
            prefix,
            data: vec![],
        }
    }

    fn terminated(&mut self, value: &str) -> String {
        let name = format!("{}_msg_{}", self.prefix, self.data.len());
        self.data.push(StringData::terminated(name.clone(), value));
        name
    }

    fn into_data(self) -> Vec<StringData> {
        self.data
    }
}
