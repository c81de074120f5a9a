use anyhow::{Context, Result};
use strum_macros::Display;

use crate::{
    assembler::{Assembler, DEFAULT_SEGMENT},
    context::ContextStack,
    diagnostics::{Diagnostic, Location},
    labels::Labels,
    output::write_image,
    segment::Segments,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Outcome {
    #[strum(serialize = "success")]
    Success,
    /// Line-level errors on the final pass.
    #[strum(serialize = "errors")]
    Errors,
    /// The pass limit ran out before the labels settled.
    #[strum(serialize = "unresolved labels")]
    Unresolved,
    /// Some label kept moving back and forth between passes.
    #[strum(serialize = "phase error")]
    PhaseError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Converged,
    PhaseError,
    Limit,
    Stuck,
}

/// Everything the final pass produced.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub name: String,
    pub segments: Segments,
    pub labels: Labels,
    pub diagnostics: Vec<Diagnostic>,
    pub passes: u32,
    pub errors: usize,
    pub warnings: usize,
    pub outcome: Outcome,
}

impl Assembly {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Contents of one segment from its lowest to its highest written
    /// address, with gaps filled with 0xFF.
    pub fn image(&self, segment: &str) -> Vec<u8> {
        let mut image = Vec::new();
        if let Some(segment) = self.segments.by_name(segment) {
            // Writing into a Vec cannot fail.
            let _ = write_image(segment.runs(), &mut image);
        }
        image
    }
}

impl Assembler {
    /// Assemble `root` from scratch until the labels settle, then run the
    /// final pass that produces output.
    pub fn assemble(&mut self, root: &str) -> Result<Assembly> {
        let text = self
            .sources
            .load(root)
            .with_context(|| format!("Couldn't read {}", root))?;

        self.labels.clear();
        for (name, value) in self.config.defines.clone() {
            self.labels.define_external(&name, value);
        }

        let limit = self.config.effective_pass_limit();
        let mut pass = 0;
        let mut previous_unresolved = None;

        let stop = loop {
            pass += 1;
            self.run_pass(pass, true, root, &text);

            let unresolved = self.labels.unresolved_count();
            let changed = self.labels.changed_count();
            log::info!(
                "pass {}: {} unresolved, {} changed, {} suppressed diagnostics",
                pass,
                unresolved,
                changed,
                self.diagnostics.suppressed_count()
            );

            if unresolved == 0 && changed == 0 {
                break Stop::Converged;
            }
            if self.labels.phase_errors().next().is_some() {
                break Stop::PhaseError;
            }
            if pass + 1 >= limit {
                break Stop::Limit;
            }
            if changed == 0 && previous_unresolved.map_or(false, |previous| unresolved >= previous) {
                break Stop::Stuck;
            }
            previous_unresolved = Some(unresolved);
        };

        pass += 1;
        self.run_pass(pass, false, root, &text);
        log::info!("final pass {} after {:?}", pass, stop);

        let phase_labels: Vec<(String, Option<Location>)> = self
            .labels
            .phase_errors()
            .map(|record| (record.name.clone(), record.location.clone()))
            .collect();

        let outcome = match stop {
            Stop::PhaseError => Outcome::PhaseError,
            Stop::Limit => Outcome::Unresolved,
            _ if !phase_labels.is_empty() => Outcome::PhaseError,
            _ if self.diagnostics.error_count() > 0 => Outcome::Errors,
            _ => Outcome::Success,
        };

        match outcome {
            Outcome::Unresolved => self.diagnostics.error(None, "could not resolve all labels"),
            Outcome::PhaseError => {
                for (name, location) in &phase_labels {
                    self.diagnostics.error(
                        location.as_ref(),
                        format!(
                            "phase error: value of label {} is not stable between passes",
                            name
                        ),
                    );
                }
            }
            _ => {}
        }
        log::info!(
            "{}: {} after {} passes, {} errors, {} warnings",
            root,
            outcome,
            pass,
            self.diagnostics.error_count(),
            self.diagnostics.warning_count()
        );

        Ok(Assembly {
            name: root.to_owned(),
            segments: self.segments.clone(),
            labels: self.labels.clone(),
            diagnostics: self.diagnostics.entries().to_vec(),
            passes: pass,
            errors: self.diagnostics.error_count(),
            warnings: self.diagnostics.warning_count(),
            outcome,
        })
    }

    fn run_pass(&mut self, pass: u32, intermediate: bool, root: &str, text: &str) {
        log::debug!("pass {} ({})", pass, if intermediate { "intermediate" } else { "final" });
        self.pass = pass;
        self.intermediate = intermediate;
        self.labels.begin_pass(pass, intermediate);
        self.diagnostics.begin_pass(intermediate);

        self.segments.clear();
        self.current = None;
        self.select_segment(DEFAULT_SEGMENT, true);
        self.context = ContextStack::new(Location::new(root, 0));
        self.input.clear();
        self.input.push_file(root, text);
        self.macros.clear();
        self.scope.reset();
        self.expansions = 0;
        self.processor = None;
        self.address_unit = 1;

        if let Some(cpu) = self.config.cpu.clone() {
            if let Err(err) = self.select_processor(&cpu) {
                self.diagnostics.error(None, err.to_string());
            }
        }

        while let Some(line) = self.input.next_line() {
            self.process_line(line);
        }

        self.diagnostics.set_current(None);
        for (location, message) in self.context.unwind() {
            self.diagnostics.error(Some(&location), message);
        }

        let vanished = self.labels.end_pass();
        if !vanished.is_empty() {
            log::debug!("labels no longer defined: {}", vanished.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{assemble_source, config::AsmConfig};

    use super::*;

    #[test]
    fn straight_line_code_needs_two_passes() -> Result<()> {
        let assembly = assemble_source("a.asm", "  db 1, 2\nend_:", AsmConfig::default())?;
        assert_eq!(assembly.outcome, Outcome::Success);
        assert_eq!(assembly.passes, 2);
        assert_eq!(assembly.labels.value("end_"), Some(2));
        Ok(())
    }

    #[test]
    fn forward_reference_resolves_on_the_next_pass() -> Result<()> {
        let assembly = assemble_source("a.asm", "  dw target\n  db 0\ntarget:", AsmConfig::default())?;
        assert!(assembly.succeeded());
        assert_eq!(assembly.passes, 3);
        assert_eq!(assembly.image("code"), [0x03, 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn undefined_label_fails_on_the_final_pass_only() -> Result<()> {
        let assembly = assemble_source("a.asm", "  db nowhere", AsmConfig::default())?;
        assert_eq!(assembly.outcome, Outcome::Errors);
        assert_eq!(assembly.diagnostics.len(), 1);
        assert_eq!(
            assembly.diagnostics[0].to_string(),
            "a.asm:1: error: undefined label: nowhere"
        );
        Ok(())
    }

    #[test]
    fn oscillating_label_is_a_phase_error() -> Result<()> {
        let source = "\
        if lab < 3
        db 0,0,0,0
        endif
lab:";
        let assembly = assemble_source("phase.asm", source, AsmConfig::default())?;
        assert_eq!(assembly.outcome, Outcome::PhaseError);
        assert_eq!(assembly.passes, 4);
        assert!(assembly.diagnostics.iter().any(|d| d.message
            == "phase error: value of label lab is not stable between passes"));
        Ok(())
    }

    const CHAIN: &str = "\
        if b
        db 0
        endif
a:
        if c
        db 0
        endif
b:
        if d
        db 0
        endif
c:
        db 0
d:";

    #[test]
    fn monotonic_chain_converges() -> Result<()> {
        let assembly = assemble_source("chain.asm", CHAIN, AsmConfig::default())?;
        assert!(assembly.succeeded(), "{:?}", assembly.diagnostics);
        assert_eq!(assembly.passes, 6);
        assert_eq!(assembly.image("code"), [0, 0, 0, 0]);
        for (name, value) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            assert_eq!(assembly.labels.value(name), Some(value), "{}", name);
        }
        Ok(())
    }

    #[test]
    fn pass_limit_stops_the_chain() -> Result<()> {
        let config = AsmConfig::default().with_pass_limit(3);
        let assembly = assemble_source("chain.asm", CHAIN, config)?;
        assert_eq!(assembly.outcome, Outcome::Unresolved);
        assert_eq!(assembly.passes, 3);
        assert!(assembly
            .diagnostics
            .iter()
            .any(|d| d.message == "could not resolve all labels"));
        Ok(())
    }

    #[test]
    fn external_defines_are_visible_on_pass_one() -> Result<()> {
        let config = AsmConfig::default().with_define("WIDTH", 3);
        let assembly = assemble_source("a.asm", "  db WIDTH * 2", config)?;
        assert!(assembly.succeeded());
        assert_eq!(assembly.passes, 2);
        assert_eq!(assembly.image("code"), [6]);
        Ok(())
    }

    #[test]
    fn reassembly_is_identical() -> Result<()> {
        let mut assembler = crate::Assembler::new(
            AsmConfig::default(),
            Box::new(crate::MemorySources::new().with("chain.asm", CHAIN)),
        );
        let first = assembler.assemble("chain.asm")?;
        let second = assembler.assemble("chain.asm")?;
        assert_eq!(first.passes, second.passes);
        assert_eq!(first.image("code"), second.image("code"));
        assert_eq!(first.diagnostics, second.diagnostics);
        Ok(())
    }
}
