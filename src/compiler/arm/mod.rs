/*
 * The ARM assembly model: instruction and operand enums rendered to GNU
 * `as` text, plus the shared runtime routines generated programs call
 * into.
 */
pub mod assembly;
pub mod util;

use std::fmt;

use assembly::{BranchLabel, StringData};

/// A complete assembly module, split the way the generator fills it:
/// program data and code first, runtime-support data and code after.
#[derive(Clone, Debug, PartialEq)]
pub struct AsmModule {
    pub data: Vec<StringData>,
    pub util_data: Vec<StringData>,
    pub text: Vec<BranchLabel>,
    pub util_text: Vec<BranchLabel>,
}

impl AsmModule {
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AsmModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.data.is_empty() || !self.util_data.is_empty() {
            f.write_str(".data\n\n")?;
            for d in self.data.iter().chain(self.util_data.iter()) {
                writeln!(f, "{}", d)?;
            }
        }
        f.write_str(".text\n\n")?;
        f.write_str(".global main\n")?;
        for label in self.text.iter().chain(self.util_text.iter()) {
            write!(f, "{}", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::assembly::{AddressOperand, Instr, Register};
    use super::*;

    #[test]
    fn data_section_is_omitted_when_empty() {
        let mut main = BranchLabel::new("main");
        main.add(Instr::Push(Register::Lr));
        main.add(Instr::Ldr(None, Register::R0, AddressOperand::Imm(0)));
        main.add(Instr::Pop(Register::Pc));
        let module = AsmModule {
            data: vec![],
            util_data: vec![],
            text: vec![main],
            util_text: vec![],
        };
        let out = module.render();
        assert!(!out.contains(".data"));
        assert!(out.starts_with(".text\n\n.global main\nmain:\n"));
    }

    #[test]
    fn data_labels_precede_the_text_section() {
        let module = AsmModule {
            data: vec![StringData::new("msg_0", "hi")],
            util_data: vec![StringData::terminated("p_print_int_msg_0", "%d")],
            text: vec![BranchLabel::new("main")],
            util_text: vec![BranchLabel::new("p_print_int")],
        };
        let out = module.render();
        let data_at = out.find(".data").unwrap();
        let text_at = out.find(".text").unwrap();
        assert!(data_at < text_at);
        assert!(out.find("msg_0:").unwrap() < out.find("p_print_int_msg_0:").unwrap());
        assert!(out.find("main:").unwrap() < out.find("p_print_int:").unwrap());
    }
}
