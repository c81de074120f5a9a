use crate::{
    diagnostics::Location,
    error::{AsmError, AsmResult},
    expr::Value,
    source::TextLine,
};

/// Raw lines captured for later replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBlock {
    lines: Vec<TextLine>,
}

impl TextBlock {
    pub fn push(&mut self, line: TextLine) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<TextLine> {
        self.lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfData {
    pub saw_else: bool,
    /// The else branch should run: the condition was resolved and false.
    pub wants_else: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchData {
    /// Cases are only looked at while this is set.
    pub wants_case: bool,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroCapture {
    pub name: String,
    pub params: Vec<String>,
    pub body: TextBlock,
    depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatCapture {
    /// `None` when the count was unresolved or never evaluated.
    pub count: Option<i64>,
    pub body: TextBlock,
    depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    Root,
    If(IfData),
    Switch(SwitchData),
    Macro(MacroCapture),
    Repeat(RepeatCapture),
}

impl FrameKind {
    fn unterminated(&self) -> Option<&'static str> {
        match self {
            FrameKind::Root => None,
            FrameKind::If(_) => Some("unterminated conditional"),
            FrameKind::Switch(_) => Some("unterminated switch"),
            FrameKind::Macro(_) => Some("unterminated macro"),
            FrameKind::Repeat(_) => Some("unterminated repeat"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFrame {
    pub kind: FrameKind,
    pub active: bool,
    pub parent_active: bool,
    pub origin: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Macro,
    Repeat,
}

/// How a raw line looks to a capturing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Open(CaptureKind),
    Close(CaptureKind),
    Other,
}

impl Marker {
    pub fn classify(opcode: Option<&str>) -> Marker {
        let Some(opcode) = opcode else {
            return Marker::Other;
        };
        let opcode = opcode.strip_prefix('.').unwrap_or(opcode).to_ascii_lowercase();
        match opcode.as_str() {
            "macro" => Marker::Open(CaptureKind::Macro),
            "rept" | "repeat" => Marker::Open(CaptureKind::Repeat),
            "endm" => Marker::Close(CaptureKind::Macro),
            "endr" => Marker::Close(CaptureKind::Repeat),
            _ => Marker::Other,
        }
    }
}

#[derive(Debug)]
pub enum CaptureStep {
    Captured,
    Finished(ContextFrame),
    Mismatch(&'static str),
}

/// Structured pseudo-op state. The root frame is always present and active.
#[derive(Debug, Clone)]
pub struct ContextStack {
    frames: Vec<ContextFrame>,
}

impl ContextStack {
    pub fn new(origin: Location) -> Self {
        Self {
            frames: vec![ContextFrame {
                kind: FrameKind::Root,
                active: true,
                parent_active: true,
                origin,
            }],
        }
    }

    pub fn active(&self) -> bool {
        self.top().active
    }

    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn top(&self) -> &ContextFrame {
        // The root frame is never popped.
        &self.frames[self.frames.len() - 1]
    }

    fn top_mut(&mut self) -> &mut ContextFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.top().kind, FrameKind::Macro(_) | FrameKind::Repeat(_))
    }

    fn push(&mut self, kind: FrameKind, computed_active: bool, origin: Location) {
        let parent_active = self.active();
        self.frames.push(ContextFrame {
            kind,
            active: computed_active && parent_active,
            parent_active,
            origin,
        });
    }

    fn pop(&mut self) -> Option<ContextFrame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    /// `condition` is `None` when unresolved or not evaluated.
    pub fn open_if(&mut self, condition: Option<bool>, origin: Location) {
        let data = IfData {
            saw_else: false,
            wants_else: condition == Some(false),
        };
        self.push(FrameKind::If(data), condition == Some(true), origin);
    }

    pub fn flip_else(&mut self) -> AsmResult<()> {
        let frame = self.top_mut();
        let parent_active = frame.parent_active;
        let FrameKind::If(data) = &mut frame.kind else {
            return Err(AsmError::context("else without if"));
        };
        if data.saw_else {
            frame.active = false;
            return if parent_active {
                Err(AsmError::context("multiple else"))
            } else {
                Ok(())
            };
        }
        data.saw_else = true;
        frame.active = data.wants_else && parent_active;
        data.wants_else = false;
        Ok(())
    }

    pub fn close_if(&mut self) -> AsmResult<()> {
        if !matches!(self.top().kind, FrameKind::If(_)) {
            return Err(AsmError::context("endif without if"));
        }
        self.pop();
        Ok(())
    }

    pub fn open_switch(&mut self, value: Value, origin: Location) {
        let data = SwitchData {
            wants_case: self.active(),
            value,
        };
        self.push(FrameKind::Switch(data), false, origin);
    }

    /// Whether the next `case` needs its values evaluated.
    pub fn wants_case(&self) -> bool {
        let frame = self.top();
        matches!(&frame.kind, FrameKind::Switch(data) if data.wants_case && !frame.active)
    }

    pub fn case(&mut self, values: &[Value]) -> AsmResult<()> {
        let frame = self.top_mut();
        let FrameKind::Switch(data) = &frame.kind else {
            return Err(AsmError::context("case without switch"));
        };
        if frame.active || !data.wants_case {
            return Ok(());
        }

        let mut matched = false;
        for value in values {
            match (&data.value, value) {
                (Value::Integer(_), Value::Str(_)) | (Value::Str(_), Value::Integer(_)) => {
                    return Err(AsmError::TypeMismatch(format!(
                        "case {} does not match the type of switch {}",
                        value, data.value
                    )))
                }
                (Value::Unresolved, _) | (_, Value::Unresolved) => {}
                (switch, case) => matched |= switch == case,
            }
        }
        frame.active = matched && frame.parent_active;
        Ok(())
    }

    pub fn break_case(&mut self) -> AsmResult<()> {
        let frame = self.top_mut();
        let FrameKind::Switch(data) = &mut frame.kind else {
            return Err(AsmError::context("break without switch"));
        };
        if frame.active {
            frame.active = false;
            data.wants_case = false;
        }
        Ok(())
    }

    pub fn close_switch(&mut self) -> AsmResult<()> {
        if !matches!(self.top().kind, FrameKind::Switch(_)) {
            return Err(AsmError::context("ends without switch"));
        }
        self.pop();
        Ok(())
    }

    pub fn open_macro(&mut self, name: &str, params: Vec<String>, origin: Location) {
        let capture = MacroCapture {
            name: name.to_owned(),
            params,
            body: TextBlock::default(),
            depth: 0,
        };
        self.push(FrameKind::Macro(capture), false, origin);
    }

    pub fn open_repeat(&mut self, count: Option<i64>, origin: Location) {
        let capture = RepeatCapture {
            count,
            body: TextBlock::default(),
            depth: 0,
        };
        self.push(FrameKind::Repeat(capture), false, origin);
    }

    /// Feed one raw line to the capturing frame on top.
    pub fn capture(&mut self, line: TextLine, marker: Marker) -> CaptureStep {
        let (body, depth, kind) = match &mut self.top_mut().kind {
            FrameKind::Macro(capture) => (&mut capture.body, &mut capture.depth, CaptureKind::Macro),
            FrameKind::Repeat(capture) => {
                (&mut capture.body, &mut capture.depth, CaptureKind::Repeat)
            }
            _ => return CaptureStep::Mismatch("nothing is being captured"),
        };

        match marker {
            Marker::Open(_) => *depth += 1,
            Marker::Close(_) if *depth > 0 => *depth -= 1,
            Marker::Close(closer) if closer == kind => {
                return match self.pop() {
                    Some(frame) => CaptureStep::Finished(frame),
                    None => CaptureStep::Mismatch("nothing is being captured"),
                };
            }
            Marker::Close(CaptureKind::Macro) => return CaptureStep::Mismatch("endm without macro"),
            Marker::Close(CaptureKind::Repeat) => {
                return CaptureStep::Mismatch("endr without repeat")
            }
            Marker::Other => {}
        }
        body.push(line);
        CaptureStep::Captured
    }

    /// Tear down everything above the root at end of input. Returns the
    /// complaints for frames whose parent was active.
    pub fn unwind(&mut self) -> Vec<(Location, &'static str)> {
        let mut complaints = Vec::new();
        while let Some(frame) = self.pop() {
            if frame.parent_active {
                if let Some(message) = frame.kind.unterminated() {
                    complaints.push((frame.origin, message));
                }
            }
        }
        complaints.reverse();
        complaints
    }
}
