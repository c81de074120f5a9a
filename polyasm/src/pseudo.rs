use crate::{
    assembler::Assembler,
    directive::PseudoOp,
    error::{AsmError, AsmResult},
    expr::{Resolver, Value},
    labels::LabelKind,
    line::{split_args, SourceLine},
};

fn unquote(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}

impl Assembler {
    /// Run a non-structural global pseudo-op on an active line.
    pub(crate) fn pseudo_op(&mut self, op: PseudoOp, line: &SourceLine) -> AsmResult<()> {
        if matches!(op, PseudoOp::Equ | PseudoOp::Set) {
            return self.define_constant(op, line);
        }

        let after = op.defines_label_after();
        if let (Some(label), false) = (line.label.as_deref(), after) {
            self.define_code_label(label)?;
        }
        self.run_pseudo_op(op, &line.operands)?;
        if let (Some(label), true) = (line.label.as_deref(), after) {
            self.define_code_label(label)?;
        }
        Ok(())
    }

    fn define_constant(&mut self, op: PseudoOp, line: &SourceLine) -> AsmResult<()> {
        let name = line
            .label
            .as_deref()
            .ok_or_else(|| AsmError::syntax("constant definition without a name"))?;
        let kind = if op == PseudoOp::Set {
            LabelKind::Set
        } else {
            LabelKind::Constant
        };
        let value = self.eval_operand(&line.operands)?;
        self.define_label(name, value, kind)
    }

    fn run_pseudo_op(&mut self, op: PseudoOp, operands: &str) -> AsmResult<()> {
        match op {
            PseudoOp::Org => {
                if let Some(pc) = self.eval_operand(operands)? {
                    self.set_pc(pc)?;
                }
                Ok(())
            }
            PseudoOp::Rorg => {
                if let Some(address) = self.eval_operand(operands)? {
                    self.set_run_address(Some(address))?;
                }
                Ok(())
            }
            PseudoOp::Rend => self.set_run_address(None),
            PseudoOp::Seg | PseudoOp::SegU => {
                let name = unquote(operands);
                if name.is_empty() {
                    return Err(AsmError::syntax("segment needs a name"));
                }
                self.select_segment(name, op == PseudoOp::Seg);
                Ok(())
            }
            PseudoOp::Byte => self.data(operands, 1),
            PseudoOp::Word => self.data(operands, 2),
            PseudoOp::Long => self.data(operands, 4),
            PseudoOp::Space => self.space(operands),
            PseudoOp::Align => self.align(operands),
            PseudoOp::Include => self.include(operands),
            PseudoOp::Processor => self.select_processor(unquote(operands)),
            PseudoOp::Error => {
                let message = self.message(operands)?;
                Err(AsmError::User(message))
            }
            PseudoOp::Warning => {
                let message = self.message(operands)?;
                self.warn(&message);
                Ok(())
            }
            PseudoOp::End => {
                self.input.clear();
                Ok(())
            }
            PseudoOp::Purgem => self.purge_macro(operands.trim()),
            PseudoOp::Equ
            | PseudoOp::Set
            | PseudoOp::If
            | PseudoOp::Else
            | PseudoOp::Endif
            | PseudoOp::Switch
            | PseudoOp::Case
            | PseudoOp::Break
            | PseudoOp::Ends
            | PseudoOp::Macro
            | PseudoOp::Endm
            | PseudoOp::Rept
            | PseudoOp::Endr => Ok(()),
        }
    }

    /// `db`, `dw` and `dl`. Only `db` accepts strings.
    fn data(&mut self, operands: &str, width: usize) -> AsmResult<()> {
        let endian = self.endian();
        let mut bytes = Vec::new();

        for item in split_args(operands)? {
            if item.is_empty() {
                return Err(AsmError::syntax("empty data item"));
            }
            match self.eval(&item)? {
                Value::Unresolved => bytes.extend(std::iter::repeat(0).take(width)),
                Value::Str(s) if width == 1 => {
                    for c in s.chars() {
                        bytes.push(self.truncate_byte(c as i64));
                    }
                }
                Value::Str(s) => {
                    return Err(AsmError::TypeMismatch(format!(
                        "string \"{}\" in word data",
                        s
                    )))
                }
                Value::Integer(v) => match width {
                    1 => bytes.push(self.truncate_byte(v)),
                    2 => {
                        if !(-32768..=65535).contains(&v) {
                            self.warn(&format!("value {} truncated to a word", v));
                        }
                        bytes.extend(endian.word(v as u16));
                    }
                    _ => {
                        if !(i32::MIN as i64..=u32::MAX as i64).contains(&v) {
                            self.warn(&format!("value {} truncated to a long", v));
                        }
                        bytes.extend(endian.long(v as u32));
                    }
                },
            }
        }

        if bytes.is_empty() {
            return Err(AsmError::syntax("missing operand"));
        }
        self.emit(&bytes)
    }

    fn space(&mut self, operands: &str) -> AsmResult<()> {
        let args = split_args(operands)?;
        let (count, fill) = match args.as_slice() {
            [count] => (count, None),
            [count, fill] => (count, Some(fill)),
            _ => return Err(AsmError::syntax("expected count[,fill]")),
        };

        let count = self.eval_operand(count)?.unwrap_or(0);
        let count = u32::try_from(count)
            .map_err(|_| AsmError::Range(format!("cannot reserve {} bytes", count)))?;

        match fill {
            Some(fill) => {
                let fill = self.eval_operand(fill)?.unwrap_or(0);
                let fill = self.truncate_byte(fill);
                self.fill(fill, count)
            }
            None => self.reserve(count),
        }
    }

    fn align(&mut self, operands: &str) -> AsmResult<()> {
        let Some(alignment) = self.eval_operand(operands)? else {
            return Ok(());
        };
        if alignment <= 0 {
            return Err(AsmError::Range(format!("cannot align to {}", alignment)));
        }
        let padding = (alignment - self.storage_pc() % alignment) % alignment;
        let bytes = padding * self.address_unit() as i64;
        let bytes = u32::try_from(bytes)
            .map_err(|_| AsmError::Range(format!("cannot align to {}", alignment)))?;
        self.reserve(bytes)
    }

    fn include(&mut self, operands: &str) -> AsmResult<()> {
        let name = match self.eval(operands)? {
            Value::Str(name) => name,
            _ => return Err(AsmError::syntax("include needs a quoted file name")),
        };
        if self.input.include_depth() >= self.config.max_include_depth {
            return Err(AsmError::context(format!(
                "include of {} nested deeper than {} files",
                name, self.config.max_include_depth
            )));
        }
        let text = self
            .sources
            .load(&name)
            .map_err(|err| AsmError::Include(format!("{} ({})", name, err)))?;
        log::debug!("including {}", name);
        self.input.push_file(&name, &text);
        Ok(())
    }

    fn message(&mut self, operands: &str) -> AsmResult<String> {
        Ok(match self.eval(operands)? {
            Value::Str(s) => s,
            Value::Integer(v) => v.to_string(),
            Value::Unresolved => operands.trim().to_owned(),
        })
    }
}
