use strum_macros::Display;

use crate::{
    diagnostics::Location,
    error::{AsmError, AsmResult},
    table::SymbolTable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum LabelKind {
    /// Injected from outside the source (`-D` on the command line).
    #[strum(serialize = "extern")]
    External,
    #[strum(serialize = "const")]
    Constant,
    #[strum(serialize = "set")]
    Set,
    #[strum(serialize = "label")]
    CodeLabel,
}

#[derive(Debug, Clone)]
pub struct LabelRecord {
    pub name: String,
    /// `None` while the value depends on something not yet known.
    pub value: Option<i64>,
    pub kind: LabelKind,
    /// Last pass on which the label was (re)defined.
    pub pass: u32,
    pub refs: u32,
    pub location: Option<Location>,
    trend: i8,
    phase_error: bool,
}

impl LabelRecord {
    pub fn resolved(&self) -> bool {
        self.value.is_some()
    }

    pub fn phase_error(&self) -> bool {
        self.phase_error
    }
}

/// The label half of the symbol table, with the pass-aware redefinition
/// rules and the counters the pass driver converges on.
#[derive(Debug, Clone)]
pub struct Labels {
    table: SymbolTable<LabelRecord>,
    pass: u32,
    intermediate: bool,
    unresolved: usize,
    changed: usize,
}

impl Labels {
    pub fn new() -> Self {
        Self {
            table: SymbolTable::new(),
            pass: 0,
            intermediate: true,
            unresolved: 0,
            changed: 0,
        }
    }

    pub fn clear(&mut self) {
        self.table.clear();
        self.pass = 0;
        self.unresolved = 0;
        self.changed = 0;
    }

    pub fn begin_pass(&mut self, pass: u32, intermediate: bool) {
        self.pass = pass;
        self.intermediate = intermediate;
        self.unresolved = 0;
        self.changed = 0;
    }

    /// Labels that were defined on an earlier pass but not on this one lose
    /// their value. Returns their names.
    pub fn end_pass(&mut self) -> Vec<String> {
        let mut vanished = Vec::new();
        for record in self.table.values_mut() {
            if record.kind != LabelKind::External && record.pass < self.pass && record.resolved() {
                record.value = None;
                vanished.push(record.name.clone());
            }
        }
        self.changed += vanished.len();
        vanished
    }

    pub fn define_external(&mut self, name: &str, value: i64) {
        self.table.insert(
            name,
            LabelRecord {
                name: name.to_owned(),
                value: Some(value),
                kind: LabelKind::External,
                pass: 0,
                refs: 0,
                location: None,
                trend: 0,
                phase_error: false,
            },
        );
    }

    pub fn define(
        &mut self,
        name: &str,
        value: Option<i64>,
        kind: LabelKind,
        location: Option<&Location>,
    ) -> AsmResult<()> {
        let pass = self.pass;
        let intermediate = self.intermediate;

        let Some(record) = self.table.get_mut(name) else {
            // A name first seen after pass 1 was skipped before; the pass
            // cannot be the last one.
            if pass > 1 {
                self.changed += 1;
            }
            self.table.insert(
                name,
                LabelRecord {
                    name: name.to_owned(),
                    value,
                    kind,
                    pass,
                    refs: 0,
                    location: location.cloned(),
                    trend: 0,
                    phase_error: false,
                },
            );
            return Ok(());
        };

        if record.kind == LabelKind::External {
            return match (record.value, value) {
                (Some(old), Some(new)) if old != new => Err(AsmError::Redefinition(format!(
                    "{name} is defined externally as {old}"
                ))),
                _ => Ok(()),
            };
        }

        if record.pass == pass {
            if record.kind != kind {
                return Err(AsmError::Redefinition(format!(
                    "{name} was already defined as a {}",
                    record.kind
                )));
            }
            if kind == LabelKind::Set {
                record.value = value;
                return Ok(());
            }
            return match (record.value, value) {
                (Some(old), Some(new)) if old != new => Err(AsmError::Redefinition(format!(
                    "{name} already has the value {old}"
                ))),
                (None, Some(_)) => {
                    record.value = value;
                    Ok(())
                }
                _ => Ok(()),
            };
        }

        // First definition on this pass.
        if kind != LabelKind::Set {
            match (record.value, value) {
                (Some(old), Some(new)) if old != new => {
                    self.changed += 1;
                    let sign = (new - old).signum() as i8;
                    if !intermediate || (record.trend != 0 && record.trend != sign) {
                        record.phase_error = true;
                    }
                    record.trend = sign;
                }
                (Some(_), None) => self.changed += 1,
                _ => {}
            }
        }
        record.value = value;
        record.kind = kind;
        record.pass = pass;
        Ok(())
    }

    /// Find a resolved label. A miss counts as unresolved; it is only an
    /// error on the final pass or when the caller cannot defer.
    pub fn lookup(&mut self, name: &str, must_be_resolved: bool) -> AsmResult<Option<&LabelRecord>> {
        let resolved = self.table.get(name).map_or(false, LabelRecord::resolved);
        if resolved {
            if let Some(record) = self.table.get_mut(name) {
                record.refs += 1;
            }
            return Ok(self.table.get(name));
        }

        self.unresolved += 1;
        if self.intermediate && !must_be_resolved {
            Ok(None)
        } else {
            Err(AsmError::UndefinedLabel(name.to_owned()))
        }
    }

    pub fn get(&self, name: &str) -> Option<&LabelRecord> {
        self.table.get(name)
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        self.table.get(name).and_then(|record| record.value)
    }

    pub fn unresolved_count(&self) -> usize {
        self.unresolved
    }

    pub fn changed_count(&self) -> usize {
        self.changed
    }

    pub fn phase_errors(&self) -> impl Iterator<Item = &LabelRecord> {
        self.table.values().filter(|record| record.phase_error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelRecord> {
        self.table.values()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Rewrites `.name` and `@name` into names scoped by the last non-local
/// label, and by the macro expansion for `@`.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    enclosing: String,
    ordinal: u32,
}

impl Scope {
    pub fn reset(&mut self) {
        self.enclosing.clear();
        self.ordinal = 0;
    }

    pub fn is_local(name: &str) -> bool {
        name.starts_with('.') || name.starts_with('@')
    }

    pub fn qualify(&self, name: &str) -> String {
        if let Some(raw) = name.strip_prefix('.') {
            format!("{}@{}", self.enclosing, raw)
        } else if let Some(raw) = name.strip_prefix('@') {
            format!("{}@{}@{}", self.enclosing, self.ordinal, raw)
        } else {
            name.to_owned()
        }
    }

    pub fn enter(&mut self, name: &str) {
        if !Self::is_local(name) {
            self.enclosing = name.to_owned();
        }
    }

    pub fn enclosing(&self) -> &str {
        &self.enclosing
    }

    pub fn set_ordinal(&mut self, ordinal: u32) {
        self.ordinal = ordinal;
    }
}
