use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::diagnostics::Location;

/// One raw source line and where diagnostics about it should point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    pub location: Location,
}

impl TextLine {
    pub fn new(text: impl Into<String>, location: Location) -> Self {
        Self {
            text: text.into(),
            location,
        }
    }
}

/// Where source text comes from.
pub trait SourceProvider {
    fn load(&self, name: &str) -> io::Result<String>;
}

/// Reads from disk, trying the name as given and then each include path.
#[derive(Debug, Clone, Default)]
pub struct FileSources {
    include_paths: Vec<PathBuf>,
}

impl FileSources {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }

    pub fn add_include_path(&mut self, path: impl AsRef<Path>) {
        self.include_paths.push(path.as_ref().to_path_buf());
    }
}

impl SourceProvider for FileSources {
    fn load(&self, name: &str) -> io::Result<String> {
        match fs::read_to_string(name) {
            Ok(text) => return Ok(text),
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
            Err(_) => {}
        }
        for dir in &self.include_paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return fs::read_to_string(candidate);
            }
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} not found", name),
        ))
    }
}

/// Named in-memory texts, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySources {
    files: HashMap<String, String>,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, text: &str) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.files.insert(name.to_owned(), text.to_owned());
    }
}

impl SourceProvider for MemorySources {
    fn load(&self, name: &str) -> io::Result<String> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not found", name)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    File,
    Macro { ordinal: u32 },
    Repeat { remaining: u32 },
}

#[derive(Debug, Clone)]
struct InputFrame {
    kind: InputKind,
    lines: Vec<TextLine>,
    next: usize,
}

/// The lines still to be read this pass: the root file, includes, and
/// macro and repeat expansions, innermost on top.
#[derive(Debug, Clone, Default)]
pub struct InputStack {
    frames: Vec<InputFrame>,
}

impl InputStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn push_file(&mut self, name: &str, text: &str) {
        let file: std::rc::Rc<str> = name.into();
        let lines = text
            .lines()
            .enumerate()
            .map(|(index, line)| TextLine::new(line, Location::new(file.clone(), index as u32 + 1)))
            .collect();
        self.frames.push(InputFrame {
            kind: InputKind::File,
            lines,
            next: 0,
        });
    }

    pub fn push_macro(&mut self, lines: Vec<TextLine>, ordinal: u32) {
        self.frames.push(InputFrame {
            kind: InputKind::Macro { ordinal },
            lines,
            next: 0,
        });
    }

    pub fn push_repeat(&mut self, lines: Vec<TextLine>, count: u32) {
        if count == 0 || lines.is_empty() {
            return;
        }
        self.frames.push(InputFrame {
            kind: InputKind::Repeat { remaining: count },
            lines,
            next: 0,
        });
    }

    pub fn next_line(&mut self) -> Option<TextLine> {
        loop {
            let frame = self.frames.last_mut()?;
            if frame.next == frame.lines.len() {
                if let InputKind::Repeat { remaining } = &mut frame.kind {
                    if *remaining > 1 {
                        *remaining -= 1;
                        frame.next = 0;
                        continue;
                    }
                }
                self.frames.pop();
                continue;
            }
            let line = frame.lines[frame.next].clone();
            frame.next += 1;
            return Some(line);
        }
    }

    pub fn include_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.kind == InputKind::File)
            .count()
    }

    /// Macro and repeat expansions currently open.
    pub fn expansion_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.kind != InputKind::File)
            .count()
    }

    /// Ordinal of the innermost macro expansion, 0 outside macros.
    pub fn macro_ordinal(&self) -> u32 {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| match frame.kind {
                InputKind::Macro { ordinal } => Some(ordinal),
                _ => None,
            })
            .unwrap_or(0)
    }
}
