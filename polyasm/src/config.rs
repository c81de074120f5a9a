/// Knobs for one assembly run. Everything here is fixed for the whole run;
/// per-pass state lives on the `Assembler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmConfig {
    /// Total passes allowed, including the final one. Never less than 2.
    pub pass_limit: u32,
    pub max_include_depth: usize,
    /// Macro and repeat expansions that may be open at once.
    pub max_nesting: usize,
    /// Constants injected before the first line is read.
    pub defines: Vec<(String, i64)>,
    /// Processor selected before the first line is read.
    pub cpu: Option<String>,
    pub warnings_as_errors: bool,
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self {
            pass_limit: 32,
            max_include_depth: 16,
            max_nesting: 32,
            defines: Vec::new(),
            cpu: None,
            warnings_as_errors: false,
        }
    }
}

impl AsmConfig {
    pub fn with_cpu(mut self, cpu: &str) -> Self {
        self.cpu = Some(cpu.to_owned());
        self
    }

    pub fn with_define(mut self, name: &str, value: i64) -> Self {
        self.defines.push((name.to_owned(), value));
        self
    }

    pub fn with_pass_limit(mut self, pass_limit: u32) -> Self {
        self.pass_limit = pass_limit;
        self
    }

    pub(crate) fn effective_pass_limit(&self) -> u32 {
        self.pass_limit.max(2)
    }
}
