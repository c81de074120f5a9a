use std::io::{self, Write};

use anyhow::Result;
use itertools::Itertools;
use polydbg::{DebugFile, DebugLabel, DebugSegment};

use crate::{
    pass::Assembly,
    record::records,
    segment::{Run, PAGE_SIZE},
};

/// Stream `runs` as one image from the lowest to the highest written
/// address. Gaps are filled with 0xFF a page at a time; where runs overlap
/// the lower-addressed run keeps its bytes.
pub fn write_image<'a>(
    runs: impl IntoIterator<Item = Run<'a>>,
    out: &mut dyn Write,
) -> io::Result<()> {
    let gap = [0xFF; PAGE_SIZE];
    let mut next: Option<u64> = None;
    for run in runs.into_iter().sorted_by_key(|run| run.address) {
        let start = run.address as u64;
        let end = start + run.bytes.len() as u64;
        let from = match next {
            Some(next) if next > start => {
                log::warn!("output overlaps at {:#x}", start);
                next.min(end)
            }
            Some(mut next) => {
                while next < start {
                    let len = (start - next).min(PAGE_SIZE as u64);
                    out.write_all(&gap[..len as usize])?;
                    next += len;
                }
                start
            }
            None => start,
        };
        out.write_all(&run.bytes[(from - start) as usize..])?;
        next = Some(next.map_or(end, |next| next.max(end)));
    }
    Ok(())
}

/// One output format, selected by name.
pub trait OutputWriter: Sync {
    fn name(&self) -> &'static str;

    fn extension(&self) -> &'static str;

    fn write(&self, assembly: &Assembly, out: &mut dyn Write) -> Result<()>;
}

pub struct HexWriter;
pub struct BinWriter;
pub struct SymWriter;
pub struct JsonWriter;

pub static WRITERS: &[&dyn OutputWriter] = &[&HexWriter, &BinWriter, &SymWriter, &JsonWriter];

pub fn find_writer(name: &str) -> Option<&'static dyn OutputWriter> {
    WRITERS
        .iter()
        .copied()
        .find(|writer| writer.name().eq_ignore_ascii_case(name))
}

impl OutputWriter for HexWriter {
    fn name(&self) -> &'static str {
        "hex"
    }

    fn extension(&self) -> &'static str {
        "hex"
    }

    fn write(&self, assembly: &Assembly, out: &mut dyn Write) -> Result<()> {
        let segments = assembly.segments.iter().filter(|s| s.generates_output());
        for record in records(segments) {
            writeln!(out, "{}", record)?;
        }
        Ok(())
    }
}

impl OutputWriter for BinWriter {
    fn name(&self) -> &'static str {
        "bin"
    }

    fn extension(&self) -> &'static str {
        "bin"
    }

    /// Every output segment in one image, gaps filled with 0xFF.
    fn write(&self, assembly: &Assembly, out: &mut dyn Write) -> Result<()> {
        let runs = assembly
            .segments
            .iter()
            .filter(|s| s.generates_output())
            .flat_map(|s| s.runs());
        write_image(runs, out)?;
        Ok(())
    }
}

impl OutputWriter for SymWriter {
    fn name(&self) -> &'static str {
        "sym"
    }

    fn extension(&self) -> &'static str {
        "sym"
    }

    fn write(&self, assembly: &Assembly, out: &mut dyn Write) -> Result<()> {
        for label in assembly.labels.iter() {
            let value = match label.value {
                Some(value) => format!("${:0>4X}", value),
                None => "?".to_owned(),
            };
            writeln!(out, "{:<24} {:>10} {}", label.name, value, label.kind)?;
        }
        Ok(())
    }
}

impl OutputWriter for JsonWriter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, assembly: &Assembly, out: &mut dyn Write) -> Result<()> {
        let mut debug = DebugFile::new(&assembly.name, assembly.passes);
        for segment in assembly.segments.iter() {
            let extent = segment.extent();
            debug.add_segment(DebugSegment {
                name: segment.name().to_owned(),
                output: segment.generates_output(),
                low: extent.map(|(low, _)| low),
                high: extent.map(|(_, high)| high),
                bytes: segment.used_bytes(),
            });
        }
        for label in assembly.labels.iter() {
            debug.add_label(DebugLabel {
                name: label.name.clone(),
                value: label.value,
                kind: label.kind.to_string(),
                file: label.location.as_ref().map(|l| l.file.to_string()),
                line: label.location.as_ref().map(|l| l.line),
                references: label.refs,
            });
        }
        writeln!(out, "{}", debug.to_string()?)?;
        Ok(())
    }
}

impl Assembly {
    /// Render with the named writer into a string. Binary formats are
    /// rejected.
    pub fn render(&self, format: &str) -> Result<String> {
        let writer = find_writer(format)
            .ok_or_else(|| anyhow::Error::msg(format!("Unknown output format {}", format)))?;
        let mut buffer = Vec::new();
        writer.write(self, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
