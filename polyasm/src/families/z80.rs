use crate::{
    assembler::Assembler,
    error::{AsmError, AsmResult},
    expr::Value,
    line::Operands,
    processor::Processor,
};

/// Byte-addressed Z80 subset.
pub struct Z80;

static IMPLIED: &[(&str, &[u8])] = &[
    ("nop", &[0x00]),
    ("halt", &[0x76]),
    ("di", &[0xF3]),
    ("ei", &[0xFB]),
    ("ret", &[0xC9]),
    ("exx", &[0xD9]),
    ("scf", &[0x37]),
    ("ccf", &[0x3F]),
    ("cpl", &[0x2F]),
    ("rla", &[0x17]),
    ("rra", &[0x1F]),
    ("rlca", &[0x07]),
    ("rrca", &[0x0F]),
    ("daa", &[0x27]),
    ("neg", &[0xED, 0x44]),
    ("ldir", &[0xED, 0xB0]),
    ("reti", &[0xED, 0x4D]),
];

fn normalize(operand: &str) -> String {
    operand
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn register(operand: &str) -> Option<u8> {
    Some(match normalize(operand).as_str() {
        "b" => 0,
        "c" => 1,
        "d" => 2,
        "e" => 3,
        "h" => 4,
        "l" => 5,
        "(hl)" => 6,
        "a" => 7,
        _ => return None,
    })
}

/// `bc de hl sp`, as used by 16-bit loads and arithmetic.
fn register_pair(operand: &str) -> Option<u8> {
    Some(match normalize(operand).as_str() {
        "bc" => 0,
        "de" => 1,
        "hl" => 2,
        "sp" => 3,
        _ => return None,
    })
}

/// `bc de hl af`, as used by push and pop.
fn stack_pair(operand: &str) -> Option<u8> {
    match normalize(operand).as_str() {
        "af" => Some(3),
        "sp" => None,
        other => register_pair(other),
    }
}

fn condition(operand: &str) -> Option<u8> {
    Some(match normalize(operand).as_str() {
        "nz" => 0,
        "z" => 1,
        "nc" => 2,
        "c" => 3,
        "po" => 4,
        "pe" => 5,
        "p" => 6,
        "m" => 7,
        _ => return None,
    })
}

fn value(asm: &mut Assembler, operand: &str) -> AsmResult<i64> {
    Ok(asm.eval_operand(operand)?.unwrap_or(0))
}

fn byte(asm: &mut Assembler, operand: &str) -> AsmResult<u8> {
    let value = value(asm, operand)?;
    Ok(asm.truncate_byte(value))
}

fn word(asm: &mut Assembler, operand: &str) -> AsmResult<[u8; 2]> {
    let value = value(asm, operand)?;
    if !(-32768..=65535).contains(&value) {
        asm.warn(&format!("value {} truncated to a word", value));
    }
    Ok((value as u16).to_le_bytes())
}

/// Displacement from the end of a two-byte instruction.
fn relative(asm: &mut Assembler, operand: &str) -> AsmResult<u8> {
    let Some(target) = asm.eval_operand(operand)? else {
        return Ok(0);
    };
    let displacement = target - (asm.pc() + 2);
    if !(-128..=127).contains(&displacement) && asm.is_final_pass() {
        return Err(AsmError::Range(format!(
            "relative jump of {} bytes",
            displacement
        )));
    }
    Ok(displacement as u8)
}

fn load(asm: &mut Assembler, operands: &mut Operands) -> AsmResult<Vec<u8>> {
    operands.expect_count(2)?;
    let destination = operands.next()?;
    let source = operands.next()?;

    if let Some(d) = register(&destination) {
        return match register(&source) {
            Some(6) if d == 6 => Err(AsmError::syntax("ld (hl),(hl) is not an instruction")),
            Some(s) => Ok(vec![0x40 | d << 3 | s]),
            None => Ok(vec![0x06 | d << 3, byte(asm, &source)?]),
        };
    }
    if let Some(dd) = register_pair(&destination) {
        let [lo, hi] = word(asm, &source)?;
        return Ok(vec![0x01 | dd << 4, lo, hi]);
    }
    Err(AsmError::syntax(format!(
        "unsupported operands for ld: {}",
        operands.raw()
    )))
}

fn inc_dec(operands: &mut Operands, register_base: u8, pair_base: u8) -> AsmResult<Vec<u8>> {
    operands.expect_count(1)?;
    let operand = operands.next()?;
    if let Some(r) = register(&operand) {
        Ok(vec![register_base | r << 3])
    } else if let Some(ss) = register_pair(&operand) {
        Ok(vec![pair_base | ss << 4])
    } else {
        Err(AsmError::syntax(format!("cannot increment {}", operand)))
    }
}

/// `jp`/`call`: `nn` or `cc,nn`.
fn absolute(
    asm: &mut Assembler,
    operands: &mut Operands,
    always: u8,
    conditional: u8,
) -> AsmResult<Vec<u8>> {
    let opcode = match operands.len() {
        1 => always,
        2 => {
            let cc = operands.next()?;
            let cc = condition(&cc)
                .ok_or_else(|| AsmError::syntax(format!("unknown condition {}", cc)))?;
            conditional | cc << 3
        }
        _ => return Err(AsmError::syntax("expected a target")),
    };
    let [lo, hi] = word(asm, &operands.next()?)?;
    Ok(vec![opcode, lo, hi])
}

fn jump_relative(asm: &mut Assembler, operands: &mut Operands) -> AsmResult<Vec<u8>> {
    let opcode = match operands.len() {
        1 => 0x18,
        2 => {
            let cc = operands.next()?;
            match condition(&cc) {
                Some(cc @ 0..=3) => 0x20 | cc << 3,
                _ => return Err(AsmError::syntax(format!("jr cannot test {}", cc))),
            }
        }
        _ => return Err(AsmError::syntax("expected a target")),
    };
    let displacement = relative(asm, &operands.next()?)?;
    Ok(vec![opcode, displacement])
}

impl Processor for Z80 {
    fn family(&self) -> &'static str {
        "z80"
    }

    fn cpus(&self) -> &'static [&'static str] {
        &["z80"]
    }

    fn attempt_pseudo_opcode(
        &self,
        asm: &mut Assembler,
        opcode: &str,
        operands: &mut Operands,
        label: Option<&str>,
    ) -> AsmResult<bool> {
        if !opcode.eq_ignore_ascii_case("defm") {
            return Ok(false);
        }
        if let Some(label) = label {
            asm.define_code_label(label)?;
        }
        let mut bytes = Vec::new();
        for item in operands.items() {
            match asm.eval(item)? {
                Value::Str(s) => {
                    for c in s.chars() {
                        bytes.push(asm.truncate_byte(c as i64));
                    }
                }
                Value::Integer(v) => bytes.push(asm.truncate_byte(v)),
                Value::Unresolved => bytes.push(0),
            }
        }
        asm.emit(&bytes)?;
        Ok(true)
    }

    fn attempt_opcode(
        &self,
        asm: &mut Assembler,
        opcode: &str,
        operands: &mut Operands,
    ) -> AsmResult<bool> {
        let mnemonic = opcode.to_ascii_lowercase();
        if let Some((_, bytes)) = IMPLIED.iter().find(|(name, _)| *name == mnemonic) {
            operands.expect_count(0)?;
            asm.emit(bytes)?;
            return Ok(true);
        }

        let bytes = match mnemonic.as_str() {
            "ld" => load(asm, operands)?,
            "inc" => inc_dec(operands, 0x04, 0x03)?,
            "dec" => inc_dec(operands, 0x05, 0x0B)?,
            "jp" if operands.len() == 1 && normalize(operands.raw()) == "(hl)" => vec![0xE9],
            "jp" => absolute(asm, operands, 0xC3, 0xC2)?,
            "call" => absolute(asm, operands, 0xCD, 0xC4)?,
            "jr" => jump_relative(asm, operands)?,
            "djnz" => {
                operands.expect_count(1)?;
                vec![0x10, relative(asm, &operands.next()?)?]
            }
            "rst" => {
                operands.expect_count(1)?;
                let target = value(asm, &operands.next()?)?;
                if !(0..=0x38).contains(&target) || target % 8 != 0 {
                    return Err(AsmError::Range(format!("rst {:#x}", target)));
                }
                vec![0xC7 | target as u8]
            }
            "push" | "pop" => {
                operands.expect_count(1)?;
                let operand = operands.next()?;
                let qq = stack_pair(&operand)
                    .ok_or_else(|| AsmError::syntax(format!("cannot {} {}", mnemonic, operand)))?;
                let base = if mnemonic == "push" { 0xC5 } else { 0xC1 };
                vec![base | qq << 4]
            }
            _ => return Ok(false),
        };
        asm.emit(&bytes)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::{assemble_source, config::AsmConfig};

    fn image(source: &str) -> anyhow::Result<Vec<u8>> {
        let assembly = assemble_source("z80.asm", source, AsmConfig::default().with_cpu("z80"))?;
        assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
        Ok(assembly.image("code"))
    }

    #[test]
    fn register_loads() -> anyhow::Result<()> {
        assert_eq!(image("  ld a, 5\n  ld b, a\n  ld (hl), 0xFF")?, [0x3E, 5, 0x47, 0x36, 0xFF]);
        assert_eq!(image("  ld hl, 0x1234")?, [0x21, 0x34, 0x12]);
        Ok(())
    }

    #[test]
    fn implied_and_prefixed() -> anyhow::Result<()> {
        assert_eq!(image("  nop\n  neg\n  HALT")?, [0x00, 0xED, 0x44, 0x76]);
        Ok(())
    }

    #[test]
    fn jumps() -> anyhow::Result<()> {
        let source = "\
start:  jp start
        jp nz, start
        call z, start
        jr start
        jr c, start
        djnz start
        rst 0x38
        push af
        pop bc";
        assert_eq!(
            image(source)?,
            [
                0xC3, 0x00, 0x00, // jp
                0xC2, 0x00, 0x00, // jp nz
                0xCC, 0x00, 0x00, // call z
                0x18, 0xF5, // jr -11
                0x38, 0xF3, // jr c, -13
                0x10, 0xF1, // djnz -15
                0xFF, 0xF5, 0xC1
            ]
        );
        Ok(())
    }

    #[test]
    fn forward_relative_jump() -> anyhow::Result<()> {
        assert_eq!(image("  jr done\n  nop\ndone:")?, [0x18, 0x01, 0x00]);
        Ok(())
    }

    #[test]
    fn relative_jump_out_of_range() -> anyhow::Result<()> {
        let assembly = crate::assemble_source(
            "far.asm",
            "  jr far\n  ds 200\nfar:",
            AsmConfig::default().with_cpu("z80"),
        )?;
        assert!(!assembly.succeeded());
        assert!(assembly.diagnostics[0].message.contains("relative jump"));
        Ok(())
    }

    #[test]
    fn defm_emits_text() -> anyhow::Result<()> {
        assert_eq!(image("msg defm \"Hi\", 0")?, [b'H', b'i', 0]);
        Ok(())
    }
}
