use crate::{
    config::AsmConfig,
    context::{CaptureStep, ContextFrame, ContextStack, FrameKind, MacroCapture, Marker},
    diagnostics::{Diagnostics, Location},
    directive::PseudoOp,
    error::{AsmError, AsmResult},
    expr::{self, Resolver, Value},
    labels::{LabelKind, Labels, Scope},
    line::{split_args, split_line, Operands, SourceLine},
    processor::{find_processor, Endian, Processor},
    segment::{SegmentId, Segments, PAGE_SIZE},
    source::{InputStack, SourceProvider, TextLine},
    table::SymbolTable,
};

pub const DEFAULT_SEGMENT: &str = "code";

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub params: Vec<String>,
    pub body: Vec<TextLine>,
}

/// All state of one assembly run.
///
/// Nothing is shared between instances, so several assemblers can run side
/// by side in one process.
pub struct Assembler {
    pub(crate) config: AsmConfig,
    pub(crate) sources: Box<dyn SourceProvider>,
    pub(crate) labels: Labels,
    pub(crate) segments: Segments,
    pub(crate) current: Option<SegmentId>,
    pub(crate) context: ContextStack,
    pub(crate) input: InputStack,
    pub(crate) macros: SymbolTable<MacroDef>,
    pub(crate) scope: Scope,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) processor: Option<&'static dyn Processor>,
    pub(crate) address_unit: u32,
    pub(crate) pass: u32,
    pub(crate) intermediate: bool,
    pub(crate) expansions: u32,
}

impl Assembler {
    pub fn new(config: AsmConfig, sources: Box<dyn SourceProvider>) -> Self {
        let diagnostics = Diagnostics::new(config.warnings_as_errors);
        Self {
            config,
            sources,
            labels: Labels::new(),
            segments: Segments::new(),
            current: None,
            context: ContextStack::new(Location::new("", 0)),
            input: InputStack::new(),
            macros: SymbolTable::new(),
            scope: Scope::default(),
            diagnostics,
            processor: None,
            address_unit: 1,
            pass: 0,
            intermediate: true,
            expansions: 0,
        }
    }

    pub fn config(&self) -> &AsmConfig {
        &self.config
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    pub fn is_final_pass(&self) -> bool {
        !self.intermediate
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn eval(&mut self, text: &str) -> AsmResult<Value> {
        expr::evaluate(text, self)
    }

    /// Evaluate an operand that must be a number. `None` while unresolved.
    pub fn eval_operand(&mut self, text: &str) -> AsmResult<Option<i64>> {
        self.eval(text)?.integer()
    }

    pub fn warn(&mut self, message: &str) {
        self.diagnostics.warning(None, message);
    }

    /// Run address of the next byte, in address units.
    pub fn pc(&self) -> i64 {
        self.current
            .map_or(0, |id| self.segments.get(id).run_pc())
    }

    pub fn address_unit(&self) -> u32 {
        self.address_unit
    }

    pub fn set_address_unit(&mut self, unit: u32) {
        self.address_unit = unit.max(1);
    }

    pub fn endian(&self) -> Endian {
        self.processor.map_or(Endian::Little, |p| p.endian())
    }

    /// Low byte of `value`, warning when it does not fit a byte.
    pub fn truncate_byte(&mut self, value: i64) -> u8 {
        if !(-128..=255).contains(&value) {
            self.warn(&format!("value {} truncated to a byte", value));
        }
        value as u8
    }

    fn current_segment(&mut self) -> AsmResult<SegmentId> {
        match self.current {
            Some(id) => Ok(id),
            None => {
                let (id, _) = self.segments.select(DEFAULT_SEGMENT, true);
                self.current = Some(id);
                Ok(id)
            }
        }
    }

    fn storage_address(&self, id: SegmentId) -> AsmResult<u32> {
        let pc = self.segments.get(id).pc() as u64 * self.address_unit as u64;
        u32::try_from(pc).map_err(|_| AsmError::Range(format!("storage address {:#x} too large", pc)))
    }

    fn units(&self, bytes: usize) -> u32 {
        let unit = self.address_unit as usize;
        ((bytes + unit - 1) / unit) as u32
    }

    /// Write bytes at the PC and move past them.
    pub fn emit(&mut self, bytes: &[u8]) -> AsmResult<()> {
        let id = self.current_segment()?;
        let next_pc = self.segments.get(id).advanced(self.units(bytes.len()))?;
        if !self.segments.get(id).generates_output() {
            self.warn("initialized data in uninitialized segment ignored");
        } else if !self.intermediate {
            let address = self.storage_address(id)?;
            self.segments.get_mut(id).write_bytes(address, bytes)?;
        }
        self.segments.get_mut(id).set_pc(next_pc as i64)
    }

    /// Write `count` copies of `byte`, a page at a time.
    pub fn fill(&mut self, byte: u8, count: u32) -> AsmResult<()> {
        let id = self.current_segment()?;
        let next_pc = self.segments.get(id).advanced(self.units(count as usize))?;
        if !self.segments.get(id).generates_output() {
            self.warn("initialized data in uninitialized segment ignored");
            return self.segments.get_mut(id).set_pc(next_pc as i64);
        }
        if self.intermediate {
            return self.segments.get_mut(id).set_pc(next_pc as i64);
        }

        let chunk = [byte; PAGE_SIZE];
        let mut remaining = count as usize;
        while remaining > 0 {
            let len = remaining.min(PAGE_SIZE);
            self.emit(&chunk[..len])?;
            remaining -= len;
        }
        Ok(())
    }

    /// Move the PC past `bytes` bytes without writing them.
    pub fn reserve(&mut self, bytes: u32) -> AsmResult<()> {
        let id = self.current_segment()?;
        let next_pc = self.segments.get(id).advanced(self.units(bytes as usize))?;
        let address = self.storage_address(id)?;
        self.segments.get_mut(id).reserve_space(address, bytes);
        self.segments.get_mut(id).set_pc(next_pc as i64)
    }

    pub fn set_pc(&mut self, pc: i64) -> AsmResult<()> {
        let id = self.current_segment()?;
        let segment = self.segments.get_mut(id);
        segment.set_pc(pc)?;
        segment.set_code_gen_offset(0);
        Ok(())
    }

    pub fn set_run_address(&mut self, address: Option<i64>) -> AsmResult<()> {
        let id = self.current_segment()?;
        let segment = self.segments.get_mut(id);
        let offset = address.map_or(0, |address| address - segment.pc() as i64);
        segment.set_code_gen_offset(offset);
        Ok(())
    }

    pub fn select_segment(&mut self, name: &str, generate_output: bool) {
        let (id, mismatch) = self.segments.select(name, generate_output);
        if mismatch {
            self.warn(&format!(
                "segment {} was declared with a different output setting",
                name
            ));
        }
        self.current = Some(id);
    }

    pub fn select_processor(&mut self, cpu: &str) -> AsmResult<()> {
        let processor =
            find_processor(cpu).ok_or_else(|| AsmError::syntax(format!("unknown processor {}", cpu)))?;
        if let Some(old) = self.processor.take() {
            log::debug!("leaving processor family {}", old.family());
            old.deselect(self);
        }
        log::debug!("selecting {} ({})", cpu, processor.family());
        processor.select(self, cpu);
        self.processor = Some(processor);
        Ok(())
    }

    pub fn define_label(&mut self, name: &str, value: Option<i64>, kind: LabelKind) -> AsmResult<()> {
        let qualified = self.scope.qualify(name);
        let location = self.diagnostics.current().cloned();
        self.labels.define(&qualified, value, kind, location.as_ref())?;
        if kind == LabelKind::CodeLabel {
            self.scope.enter(name);
        }
        Ok(())
    }

    /// Give `name` the current run address.
    pub fn define_code_label(&mut self, name: &str) -> AsmResult<()> {
        let pc = self.pc();
        self.define_label(name, Some(pc), LabelKind::CodeLabel)
    }

    pub(crate) fn process_line(&mut self, line: TextLine) {
        self.diagnostics.set_current(Some(line.location.clone()));
        self.scope.set_ordinal(self.input.macro_ordinal());
        log::trace!("{}: {}", line.location, line.text);

        let parsed = split_line(&line.text);
        if self.context.is_capturing() {
            let marker = Marker::classify(parsed.opcode.as_deref());
            match self.context.capture(line, marker) {
                CaptureStep::Captured => {}
                CaptureStep::Mismatch(message) => self.diagnostics.error(None, message),
                CaptureStep::Finished(frame) => {
                    let origin = frame.origin.clone();
                    if let Err(err) = self.finish_capture(frame) {
                        self.diagnostics.error(Some(&origin), err.to_string());
                    }
                }
            }
            return;
        }

        if let Err(err) = self.dispatch(&parsed, &line.location) {
            self.diagnostics.error(None, err.to_string());
        }
    }

    fn dispatch(&mut self, line: &SourceLine, location: &Location) -> AsmResult<()> {
        let Some(opcode) = line.opcode.as_deref() else {
            if let (true, Some(label)) = (self.context.active(), line.label.as_deref()) {
                self.define_code_label(label)?;
            }
            return Ok(());
        };

        let pseudo = PseudoOp::parse(opcode);
        if let Some(op) = pseudo.filter(|op| op.is_structural()) {
            return self.structural(op, line, location);
        }
        if !self.context.active() {
            return Ok(());
        }

        if let Some(op) = pseudo {
            return self.pseudo_op(op, line);
        }

        let mut operands = Operands::parse(&line.operands)?;
        if let Some(processor) = self.processor {
            if processor.attempt_pseudo_opcode(self, opcode, &mut operands, line.label.as_deref())? {
                return Ok(());
            }
        }

        if let Some(label) = line.label.as_deref() {
            self.define_code_label(label)?;
        }

        if let Some((_, def)) = self.macros.get_ignore_case(opcode) {
            let def = def.clone();
            return self.expand_macro(opcode, &def, &line.operands, location);
        }

        if let Some(processor) = self.processor {
            if processor.attempt_opcode(self, opcode, &mut operands)? {
                return Ok(());
            }
        }

        Err(AsmError::UnknownOpcode(opcode.to_owned()))
    }

    fn structural(&mut self, op: PseudoOp, line: &SourceLine, location: &Location) -> AsmResult<()> {
        let active = self.context.active();
        // A bad label must not keep the frame from opening.
        let labelled = match line.label.as_deref() {
            Some(label) if active && op != PseudoOp::Macro => self.define_code_label(label),
            _ => Ok(()),
        };

        let result = match op {
            PseudoOp::If => {
                let condition = if active {
                    self.eval(&line.operands)
                } else {
                    Ok(Value::Unresolved)
                };
                let flag = match &condition {
                    Ok(Value::Integer(v)) => Some(*v != 0),
                    _ => None,
                };
                self.context.open_if(flag, location.clone());
                match condition? {
                    Value::Str(s) => Err(AsmError::TypeMismatch(format!(
                        "condition \"{}\" is not a number",
                        s
                    ))),
                    _ => Ok(()),
                }
            }
            PseudoOp::Else => self.context.flip_else(),
            PseudoOp::Endif => self.context.close_if(),
            PseudoOp::Switch => {
                let value = if active {
                    self.eval(&line.operands)
                } else {
                    Ok(Value::Unresolved)
                };
                let (value, result) = match value {
                    Ok(value) => (value, Ok(())),
                    Err(err) => (Value::Unresolved, Err(err)),
                };
                self.context.open_switch(value, location.clone());
                result
            }
            PseudoOp::Case => {
                let mut values = Vec::new();
                if self.context.wants_case() {
                    for arg in split_args(&line.operands)? {
                        values.push(self.eval(&arg)?);
                    }
                }
                self.context.case(&values)
            }
            PseudoOp::Break => self.context.break_case(),
            PseudoOp::Ends => self.context.close_switch(),
            PseudoOp::Macro => {
                let (name, params) = match line.label.as_deref() {
                    Some(label) => (label.to_owned(), line.operands.clone()),
                    None => {
                        let operands = line.operands.trim();
                        let (name, rest) = operands
                            .split_once(char::is_whitespace)
                            .unwrap_or((operands, ""));
                        (name.to_owned(), rest.to_owned())
                    }
                };
                let (params, result) = match split_args(&params) {
                    Ok(params) => (params, Ok(())),
                    Err(err) => (Vec::new(), Err(err)),
                };
                self.context.open_macro(&name, params, location.clone());
                if name.is_empty() {
                    return Err(AsmError::syntax("macro needs a name"));
                }
                result
            }
            PseudoOp::Rept => {
                let count = if active {
                    self.eval_operand(&line.operands)
                } else {
                    Ok(None)
                };
                let (count, result) = match count {
                    Ok(count) => (count, Ok(())),
                    Err(err) => (None, Err(err)),
                };
                self.context.open_repeat(count, location.clone());
                result
            }
            PseudoOp::Endm if active => Err(AsmError::context("endm without macro")),
            PseudoOp::Endr if active => Err(AsmError::context("endr without repeat")),
            _ => Ok(()),
        };
        labelled.and(result)
    }

    fn finish_capture(&mut self, frame: ContextFrame) -> AsmResult<()> {
        if !frame.parent_active {
            return Ok(());
        }
        match frame.kind {
            FrameKind::Macro(capture) => self.define_macro(capture),
            FrameKind::Repeat(capture) => {
                let count = match capture.count {
                    Some(count) if count >= 0 => count,
                    other => {
                        let shown = other.map_or("unresolved".to_owned(), |c| c.to_string());
                        self.diagnostics.warning(
                            Some(&frame.origin),
                            format!("repeat count {} treated as 0", shown),
                        );
                        0
                    }
                };
                let count = u32::try_from(count)
                    .map_err(|_| AsmError::Range(format!("repeat count {} too large", count)))?;
                if count > 0 {
                    self.check_nesting()?;
                    self.input.push_repeat(capture.body.into_lines(), count);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn define_macro(&mut self, capture: MacroCapture) -> AsmResult<()> {
        if self.macros.get_ignore_case(&capture.name).is_some() {
            return Err(AsmError::context(format!(
                "macro redefinition: {}",
                capture.name
            )));
        }
        log::debug!(
            "macro {} ({} params, {} lines)",
            capture.name,
            capture.params.len(),
            capture.body.len()
        );
        self.macros.insert(
            capture.name,
            MacroDef {
                params: capture.params,
                body: capture.body.into_lines(),
            },
        );
        Ok(())
    }

    pub(crate) fn purge_macro(&mut self, name: &str) -> AsmResult<()> {
        self.macros
            .remove_ignore_case(name)
            .map(|_| ())
            .ok_or_else(|| AsmError::context(format!("no macro named {}", name)))
    }

    fn check_nesting(&self) -> AsmResult<()> {
        if self.input.expansion_depth() >= self.config.max_nesting {
            Err(AsmError::Nesting)
        } else {
            Ok(())
        }
    }

    fn expand_macro(
        &mut self,
        name: &str,
        def: &MacroDef,
        operands: &str,
        location: &Location,
    ) -> AsmResult<()> {
        let args = split_args(operands)?;
        if args.len() > def.params.len() {
            return Err(AsmError::syntax(format!(
                "too many arguments to macro {}: expected at most {}",
                name,
                def.params.len()
            )));
        }
        self.check_nesting()?;

        self.expansions += 1;
        let lines = def
            .body
            .iter()
            .map(|line| TextLine::new(substitute(&line.text, &def.params, &args), location.clone()))
            .collect();
        self.input.push_macro(lines, self.expansions);
        Ok(())
    }
}

impl Resolver for Assembler {
    fn label_value(&mut self, name: &str) -> AsmResult<Option<i64>> {
        let qualified = self.scope.qualify(name);
        match self.labels.lookup(&qualified, false)? {
            Some(record) => Ok(record.value),
            None => {
                self.diagnostics
                    .warning(None, format!("undefined label {}", name));
                Ok(None)
            }
        }
    }

    fn run_pc(&self) -> i64 {
        self.pc()
    }

    fn storage_pc(&self) -> i64 {
        self.current
            .map_or(0, |id| self.segments.get(id).pc() as i64)
    }

    fn warn(&mut self, message: &str) {
        Assembler::warn(self, message);
    }
}

/// Replace whole-identifier occurrences of `params` outside quotes.
fn substitute(text: &str, params: &[String], args: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '"' | '\'' => {
                out.push(c);
                let mut escaped = false;
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == c {
                        break;
                    }
                }
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some(&(i, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        end = i + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &text[start..end];
                match params.iter().position(|param| param == word) {
                    Some(index) if !c.is_ascii_digit() => {
                        out.push_str(args.get(index).map_or("", String::as_str))
                    }
                    _ => out.push_str(word),
                }
            }
            _ => out.push(c),
        }
    }
    out
}
