use std::fmt::*;

/*
ARM assembly DSL

The generator builds values of these enums and renders them with Display;
the output is GNU-assembler syntax for ARMv6.

Immediate operands are prefixed with #, load-immediate pseudo operands
with = (the assembler places the literal in the pool flushed by .ltorg).
Conditional execution is expressed by an optional condition code suffixed
to the mnemonic:

```text
    LDR r4, =42
    CMP r4, #0
    MOVEQ r4, #1
    MOVNE r4, #0
    BLVS p_throw_overflow_error
```
*/

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    R12,
    Sp,
    Lr,
    Pc,
}

/// First register of the pool expression evaluation works in.
pub const RESULT_REG: Register = Register::R4;

impl Register {
    /// The next register of the working pool (`r4`..`r11`), or `None`
    /// when the pool is exhausted.
    pub fn next(self) -> Option<Register> {
        use Register::*;
        match self {
            R4 => Some(R5),
            R5 => Some(R6),
            R6 => Some(R7),
            R7 => Some(R8),
            R8 => Some(R9),
            R9 => Some(R10),
            R10 => Some(R11),
            _ => None,
        }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        use Register::*;
        match self {
            R0 => f.write_str("r0"),
            R1 => f.write_str("r1"),
            R2 => f.write_str("r2"),
            R3 => f.write_str("r3"),
            R4 => f.write_str("r4"),
            R5 => f.write_str("r5"),
            R6 => f.write_str("r6"),
            R7 => f.write_str("r7"),
            R8 => f.write_str("r8"),
            R9 => f.write_str("r9"),
            R10 => f.write_str("r10"),
            R11 => f.write_str("r11"),
            R12 => f.write_str("r12"),
            Sp => f.write_str("sp"),
            Lr => f.write_str("lr"),
            Pc => f.write_str("pc"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CondCode {
    Eq,
    Ne,
    Ge,
    Lt,
    Gt,
    Le,
    Vs,
    Cs,
}

impl CondCode {
    /// The code that accepts exactly the operands this one rejects.
    pub fn negate(self) -> CondCode {
        use CondCode::*;
        match self {
            Eq => Ne,
            Ne => Eq,
            Ge => Lt,
            Lt => Ge,
            Gt => Le,
            Le => Gt,
            Vs => Vs,
            Cs => Cs,
        }
    }
}

impl Display for CondCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        use CondCode::*;
        match self {
            Eq => f.write_str("EQ"),
            Ne => f.write_str("NE"),
            Ge => f.write_str("GE"),
            Lt => f.write_str("LT"),
            Gt => f.write_str("GT"),
            Le => f.write_str("LE"),
            Vs => f.write_str("VS"),
            Cs => f.write_str("CS"),
        }
    }
}

/// Optional condition suffix; `None` executes unconditionally.
pub type Cond = Option<CondCode>;

struct CondSuffix(Cond);

impl Display for CondSuffix {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.0 {
            Some(cc) => write!(f, "{}", cc),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Imm(i32),
    Chr(char),
    Reg(Register),
    /// Register shifted left, `r5, LSL #2`.
    Lsl(Register, u32),
    /// Register shifted right arithmetically, `r4, ASR #31`.
    Asr(Register, u32),
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Operand::Imm(i) => write!(f, "#{}", i),
            Operand::Chr(c) => write!(f, "#'{}'", escape_char(*c)),
            Operand::Reg(r) => write!(f, "{}", r),
            Operand::Lsl(r, sh) => write!(f, "{}, LSL #{}", r, sh),
            Operand::Asr(r, sh) => write!(f, "{}, ASR #{}", r, sh),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AddressOperand {
    /// Literal-pool immediate, `=42`.
    Imm(i32),
    /// Literal-pool address of a label, `=msg_0`.
    Label(String),
    /// `[rN]`.
    Zero(Register),
    /// `[rN, #off]`; rendered `[rN]` when the offset is zero.
    Offset(Register, i32),
    /// Pre-indexed with writeback, `[rN, #off]!`.
    PreIndexed(Register, i32),
}

impl Display for AddressOperand {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            AddressOperand::Imm(i) => write!(f, "={}", i),
            AddressOperand::Label(l) => write!(f, "={}", l),
            AddressOperand::Zero(r) => write!(f, "[{}]", r),
            AddressOperand::Offset(r, 0) => write!(f, "[{}]", r),
            AddressOperand::Offset(r, off) => write!(f, "[{}, #{}]", r, off),
            AddressOperand::PreIndexed(r, off) => write!(f, "[{}, #{}]!", r, off),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instr {
    Push(Register),
    Pop(Register),
    Ldr(Cond, Register, AddressOperand),
    Ldrsb(Cond, Register, AddressOperand),
    Str(Register, AddressOperand),
    Strb(Register, AddressOperand),
    Mov(Cond, Register, Operand),
    Cmp(Register, Operand),
    /// `true` sets the flags (`ADDS`).
    Add(bool, Register, Register, Operand),
    Sub(bool, Register, Register, Operand),
    Rsbs(Register, Register, Operand),
    Smull(Register, Register, Register, Register),
    And(Register, Register, Operand),
    Orr(Register, Register, Operand),
    Eor(Register, Register, Operand),
    Branch(Cond, String),
    BranchLink(Cond, String),
    Ltorg,
}

impl Display for Instr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        use Instr::*;
        match self {
            Push(r) => write!(f, "PUSH {{{}}}", r),
            Pop(r) => write!(f, "POP {{{}}}", r),
            Ldr(cond, r, addr) => write!(f, "LDR{} {}, {}", CondSuffix(*cond), r, addr),
            Ldrsb(cond, r, addr) => write!(f, "LDRSB{} {}, {}", CondSuffix(*cond), r, addr),
            Str(r, addr) => write!(f, "STR {}, {}", r, addr),
            Strb(r, addr) => write!(f, "STRB {}, {}", r, addr),
            Mov(cond, r, op) => write!(f, "MOV{} {}, {}", CondSuffix(*cond), r, op),
            Cmp(r, op) => write!(f, "CMP {}, {}", r, op),
            Add(false, rd, rn, op) => write!(f, "ADD {}, {}, {}", rd, rn, op),
            Add(true, rd, rn, op) => write!(f, "ADDS {}, {}, {}", rd, rn, op),
            Sub(false, rd, rn, op) => write!(f, "SUB {}, {}, {}", rd, rn, op),
            Sub(true, rd, rn, op) => write!(f, "SUBS {}, {}, {}", rd, rn, op),
            Rsbs(rd, rn, op) => write!(f, "RSBS {}, {}, {}", rd, rn, op),
            Smull(rdlo, rdhi, rm, rs) => write!(f, "SMULL {}, {}, {}, {}", rdlo, rdhi, rm, rs),
            And(rd, rn, op) => write!(f, "AND {}, {}, {}", rd, rn, op),
            Orr(rd, rn, op) => write!(f, "ORR {}, {}, {}", rd, rn, op),
            Eor(rd, rn, op) => write!(f, "EOR {}, {}, {}", rd, rn, op),
            Branch(cond, label) => write!(f, "B{} {}", CondSuffix(*cond), label),
            BranchLink(cond, label) => write!(f, "BL{} {}", CondSuffix(*cond), label),
            Ltorg => f.write_str(".ltorg"),
        }
    }
}

/// A label and the instructions under it.
#[derive(Clone, Debug, PartialEq)]
pub struct BranchLabel {
    name: String,
    instructions: Vec<Instr>,
}

impl BranchLabel {
    pub fn new(name: impl Into<String>) -> Self {
        BranchLabel {
            name: name.into(),
            instructions: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, instr: Instr) {
        self.instructions.push(instr);
    }

    pub fn extend(&mut self, instrs: impl IntoIterator<Item = Instr>) {
        self.instructions.extend(instrs);
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instructions
    }
}

impl Display for BranchLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "{}:", self.name)?;
        for instr in &self.instructions {
            writeln!(f, "\t{}", instr)?;
        }
        Ok(())
    }
}

/// A length-prefixed string in the data section. The layout matches what
/// the runtime print and trap routines expect: one word holding the byte
/// count followed by the bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct StringData {
    name: String,
    value: String,
    null_terminated: bool,
}

impl StringData {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        StringData {
            name: name.into(),
            value: value.into(),
            null_terminated: false,
        }
    }

    /// C-string variant handed to printf/scanf format strings and trap
    /// messages.
    pub fn terminated(name: impl Into<String>, value: impl Into<String>) -> Self {
        StringData {
            name: name.into(),
            value: value.into(),
            null_terminated: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for StringData {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        // Byte count, not char count: an escape sequence assembles back to
        // one byte, a non-ASCII char to its UTF-8 length.
        let len = self.value.len() + if self.null_terminated { 1 } else { 0 };
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "\t.word {}", len)?;
        write!(f, "\t.ascii\t\"{}", escape_string(&self.value))?;
        if self.null_terminated {
            f.write_str("\\0")?;
        }
        writeln!(f, "\"")
    }
}

fn escape_char(c: char) -> String {
    match c {
        '\0' => "\\0".into(),
        '\x08' => "\\b".into(),
        '\t' => "\\t".into(),
        '\n' => "\\n".into(),
        '\x0c' => "\\f".into(),
        '\r' => "\\r".into(),
        '"' => "\\\"".into(),
        '\'' => "\\'".into(),
        '\\' => "\\\\".into(),
        c => c.to_string(),
    }
}

fn escape_string(s: &str) -> String {
    s.chars().map(escape_char).collect()
}
