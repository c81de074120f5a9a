use crate::{
    assembler::Assembler,
    error::{AsmError, AsmResult},
    line::Operands,
    processor::Processor,
};

/// Word-addressed AVR subset. The PC counts 16-bit words.
pub struct Avr;

static IMPLIED: &[(&str, u16)] = &[
    ("nop", 0x0000),
    ("ret", 0x9508),
    ("reti", 0x9518),
    ("sei", 0x9478),
    ("cli", 0x94F8),
    ("sleep", 0x9588),
];

fn register(operand: &str) -> AsmResult<u16> {
    let operand = operand.trim();
    operand
        .strip_prefix(|c: char| c.eq_ignore_ascii_case(&'r'))
        .and_then(|number| number.parse::<u16>().ok())
        .filter(|number| *number < 32)
        .ok_or_else(|| AsmError::syntax(format!("expected a register, found {}", operand)))
}

fn emit_word(asm: &mut Assembler, word: u16) -> AsmResult<()> {
    let bytes = asm.endian().word(word);
    asm.emit(&bytes)
}

/// `rjmp`/`rcall` offset in words from the next instruction.
fn relative(asm: &mut Assembler, operand: &str) -> AsmResult<u16> {
    let Some(target) = asm.eval_operand(operand)? else {
        return Ok(0);
    };
    let offset = target - (asm.pc() + 1);
    if !(-2048..=2047).contains(&offset) && asm.is_final_pass() {
        return Err(AsmError::Range(format!(
            "relative jump of {} words",
            offset
        )));
    }
    Ok(offset as u16 & 0x0FFF)
}

impl Processor for Avr {
    fn family(&self) -> &'static str {
        "avr"
    }

    fn cpus(&self) -> &'static [&'static str] {
        &["avr", "atmega8", "attiny85"]
    }

    fn select(&self, asm: &mut Assembler, _cpu: &str) {
        asm.set_address_unit(2);
    }

    fn attempt_opcode(
        &self,
        asm: &mut Assembler,
        opcode: &str,
        operands: &mut Operands,
    ) -> AsmResult<bool> {
        let mnemonic = opcode.to_ascii_lowercase();
        if let Some((_, word)) = IMPLIED.iter().find(|(name, _)| *name == mnemonic) {
            operands.expect_count(0)?;
            emit_word(asm, *word)?;
            return Ok(true);
        }

        let word = match mnemonic.as_str() {
            "ldi" => {
                operands.expect_count(2)?;
                let d = register(&operands.next()?)?;
                if !(16..32).contains(&d) {
                    return Err(AsmError::Range(format!("ldi needs r16..r31, found r{}", d)));
                }
                let value = asm.eval_operand(&operands.next()?)?.unwrap_or(0);
                let k = asm.truncate_byte(value) as u16;
                0xE000 | (k & 0xF0) << 4 | (d - 16) << 4 | (k & 0x0F)
            }
            "mov" => {
                operands.expect_count(2)?;
                let d = register(&operands.next()?)?;
                let r = register(&operands.next()?)?;
                0x2C00 | (r & 0x10) << 5 | d << 4 | (r & 0x0F)
            }
            "rjmp" | "rcall" => {
                operands.expect_count(1)?;
                let base = if mnemonic == "rjmp" { 0xC000 } else { 0xD000 };
                base | relative(asm, &operands.next()?)?
            }
            _ => return Ok(false),
        };
        emit_word(asm, word)?;
        Ok(true)
    }
}
