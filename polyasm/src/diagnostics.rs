use std::fmt::{self, Display};
use std::rc::Rc;

/// Where a line came from. Replayed macro and repeat text carries the
/// location it should be blamed on, not where the replay happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Rc<str>,
    pub line: u32,
}

impl Location {
    pub fn new(file: impl Into<Rc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub location: Option<Location>,
    pub severity: Severity,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}: {}", location, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// The single complaint sink shared by every component.
///
/// While suppressed (intermediate passes) complaints are counted and logged
/// but not kept; the final pass reproduces whatever still applies.
#[derive(Debug)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    current: Option<Location>,
    suppressed: bool,
    warnings_as_errors: bool,
    errors: usize,
    warnings: usize,
    suppressed_count: usize,
}

impl Diagnostics {
    pub fn new(warnings_as_errors: bool) -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            suppressed: false,
            warnings_as_errors,
            errors: 0,
            warnings: 0,
            suppressed_count: 0,
        }
    }

    pub fn begin_pass(&mut self, suppressed: bool) {
        self.entries.clear();
        self.current = None;
        self.suppressed = suppressed;
        self.errors = 0;
        self.warnings = 0;
        self.suppressed_count = 0;
    }

    pub fn set_current(&mut self, location: Option<Location>) {
        self.current = location;
    }

    pub fn current(&self) -> Option<&Location> {
        self.current.as_ref()
    }

    /// Report a problem at `location`, or at the line being processed.
    pub fn complain(
        &mut self,
        location: Option<&Location>,
        severity: Severity,
        message: impl Into<String>,
    ) {
        let severity = if self.warnings_as_errors {
            Severity::Error
        } else {
            severity
        };
        let diagnostic = Diagnostic {
            location: location.or(self.current.as_ref()).cloned(),
            severity,
            message: message.into(),
        };

        if self.suppressed {
            self.suppressed_count += 1;
            log::debug!("(suppressed) {}", diagnostic);
            return;
        }

        match severity {
            Severity::Warning => self.warnings += 1,
            Severity::Error => self.errors += 1,
        }
        self.entries.push(diagnostic);
    }

    pub fn error(&mut self, location: Option<&Location>, message: impl Into<String>) {
        self.complain(location, Severity::Error, message);
    }

    pub fn warning(&mut self, location: Option<&Location>, message: impl Into<String>) {
        self.complain(location, Severity::Warning, message);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed_count
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }
}
