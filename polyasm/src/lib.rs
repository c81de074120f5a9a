pub mod assembler;
pub mod config;
pub mod constants;
pub mod context;
pub mod diagnostics;
pub mod directive;
pub mod error;
pub mod expr;
pub mod families;
pub mod labels;
pub mod line;
pub mod output;
pub mod pass;
pub mod processor;
mod pseudo;
pub mod record;
pub mod segment;
pub mod source;
pub mod table;

use anyhow::Result;
use itertools::Itertools;

pub use assembler::Assembler;
pub use config::AsmConfig;
pub use diagnostics::{Diagnostic, Location, Severity};
pub use error::{AsmError, AsmResult};
pub use labels::{LabelKind, LabelRecord, Labels};
pub use output::{find_writer, OutputWriter, WRITERS};
pub use pass::{Assembly, Outcome};
pub use processor::{find_processor, Processor, PROCESSORS};
pub use source::{FileSources, MemorySources, SourceProvider};

/// Assemble one in-memory file.
pub fn assemble_source(name: &str, text: &str, config: AsmConfig) -> Result<Assembly> {
    let sources = MemorySources::new().with(name, text);
    Assembler::new(config, Box::new(sources)).assemble(name)
}

/// Assemble a program and return it as Intel hex, or every diagnostic if
/// it failed.
pub fn assemble_program(program_text: &str) -> Result<String> {
    let assembly = assemble_source("program.asm", program_text, AsmConfig::default())?;
    if !assembly.succeeded() {
        let report = assembly.diagnostics.iter().join("\n");
        return Err(anyhow::Error::msg(report));
    }
    assembly.render("hex")
}
