use thiserror::Error;

/// Hard errors raised while processing a single source line.
///
/// Every variant aborts the line that raised it. The line processor reports
/// the error through the diagnostics sink exactly once; lower layers only
/// return it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("label redefinition: {0}")]
    Redefinition(String),
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("value out of range: {0}")]
    Range(String),
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),
    #[error("{0}")]
    Context(String),
    #[error("cannot open include file {0}")]
    Include(String),
    #[error("macro nesting too deep")]
    Nesting,
    #[error("{0}")]
    User(String),
}

impl AsmError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::Syntax(msg.into())
    }

    pub fn context(msg: impl Into<String>) -> Self {
        Self::Context(msg.into())
    }
}

pub type AsmResult<T> = std::result::Result<T, AsmError>;
