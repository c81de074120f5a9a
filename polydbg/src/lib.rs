use serde::{Deserialize, Serialize};
pub use serde_json::Error;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DebugLabel {
    pub name: String,
    pub value: Option<i64>,
    pub kind: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub references: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DebugSegment {
    pub name: String,
    pub output: bool,
    pub low: Option<u32>,
    pub high: Option<u32>,
    pub bytes: usize,
}

/// Symbol and segment summary written next to the assembled image.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DebugFile {
    pub name: String,
    pub passes: u32,
    pub segments: Vec<DebugSegment>,
    pub labels: Vec<DebugLabel>,
}

impl DebugFile {
    pub fn new(name: &str, passes: u32) -> Self {
        DebugFile {
            name: name.into(),
            passes,
            segments: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, segment: DebugSegment) {
        self.segments.push(segment);
    }

    pub fn add_label(&mut self, label: DebugLabel) {
        self.labels.push(label);
    }

    pub fn label(&self, name: &str) -> Option<&DebugLabel> {
        self.labels.iter().find(|label| label.name == name)
    }

    pub fn to_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_string(dbg: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(dbg)
    }
}
