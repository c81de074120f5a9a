use crate::{
    assembler::Assembler,
    error::AsmResult,
    families::{avr::Avr, z80::Z80},
    line::Operands,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn word(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    pub fn long(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// One instruction-set family.
///
/// Both `attempt_*` hooks return `Ok(false)` when the opcode is not theirs so
/// the caller can keep looking.
pub trait Processor: Sync {
    fn family(&self) -> &'static str;

    /// CPU names accepted by the `processor` pseudo-op.
    fn cpus(&self) -> &'static [&'static str];

    fn endian(&self) -> Endian {
        Endian::Little
    }

    fn select(&self, asm: &mut Assembler, cpu: &str) {
        let _ = cpu;
        asm.set_address_unit(1);
    }

    fn deselect(&self, asm: &mut Assembler) {
        asm.set_address_unit(1);
    }

    /// The family's own pseudo-ops. The handler defines `label` itself.
    fn attempt_pseudo_opcode(
        &self,
        asm: &mut Assembler,
        opcode: &str,
        operands: &mut Operands,
        label: Option<&str>,
    ) -> AsmResult<bool> {
        let _ = (asm, opcode, operands, label);
        Ok(false)
    }

    fn attempt_opcode(
        &self,
        asm: &mut Assembler,
        opcode: &str,
        operands: &mut Operands,
    ) -> AsmResult<bool>;
}

pub static PROCESSORS: &[&dyn Processor] = &[&Z80, &Avr];

pub fn find_processor(cpu: &str) -> Option<&'static dyn Processor> {
    PROCESSORS
        .iter()
        .copied()
        .find(|processor| processor.cpus().iter().any(|name| name.eq_ignore_ascii_case(cpu)))
}
