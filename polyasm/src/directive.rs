use std::str::FromStr;

use strum::EnumString;

/// Pseudo-ops every processor family shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum PseudoOp {
    #[strum(serialize = "equ", serialize = "=")]
    Equ,
    Set,
    Org,
    Rorg,
    Rend,
    Seg,
    #[strum(serialize = "seg.u")]
    SegU,
    #[strum(serialize = "db", serialize = "byte", serialize = "fcb", serialize = "defb")]
    Byte,
    #[strum(serialize = "dw", serialize = "word", serialize = "defw")]
    Word,
    #[strum(serialize = "dl", serialize = "long")]
    Long,
    #[strum(serialize = "ds", serialize = "rmb", serialize = "defs")]
    Space,
    Align,
    Include,
    #[strum(serialize = "processor", serialize = "cpu")]
    Processor,
    Error,
    Warning,
    End,
    Purgem,

    If,
    Else,
    Endif,
    Switch,
    Case,
    Break,
    Ends,
    Macro,
    Endm,
    #[strum(serialize = "rept", serialize = "repeat")]
    Rept,
    Endr,
}

impl PseudoOp {
    /// `.org` and `org` are the same thing.
    pub fn parse(opcode: &str) -> Option<Self> {
        let opcode = opcode.strip_prefix('.').unwrap_or(opcode);
        PseudoOp::from_str(opcode).ok()
    }

    /// Handled even in inactive text so nesting stays balanced.
    pub fn is_structural(self) -> bool {
        use PseudoOp::*;
        matches!(
            self,
            If | Else | Endif | Switch | Case | Break | Ends | Macro | Endm | Rept | Endr
        )
    }

    /// The label names the address after the op has moved the PC.
    pub fn defines_label_after(self) -> bool {
        use PseudoOp::*;
        matches!(self, Org | Rorg | Rend | Seg | SegU | Align)
    }
}
