use std::fmt::Display;

use crate::segment::Segment;

const MAX_DATA: usize = 16;

/// One Intel-hex line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Data { address: u16, bytes: Vec<u8> },
    ExtendedLinearAddress(u16),
    EndOfFile,
}

impl Record {
    fn kind(&self) -> u8 {
        match self {
            Record::Data { .. } => 0x00,
            Record::EndOfFile => 0x01,
            Record::ExtendedLinearAddress(_) => 0x04,
        }
    }

    fn address(&self) -> u16 {
        match self {
            Record::Data { address, .. } => *address,
            _ => 0,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Record::Data { bytes, .. } => bytes.clone(),
            Record::ExtendedLinearAddress(upper) => upper.to_be_bytes().to_vec(),
            Record::EndOfFile => Vec::new(),
        }
    }

    pub fn checksum(&self) -> u8 {
        let payload = self.payload();
        let [hi, lo] = self.address().to_be_bytes();
        let sum = payload
            .iter()
            .fold(payload.len() as u8, |sum, byte| sum.wrapping_add(*byte))
            .wrapping_add(hi)
            .wrapping_add(lo)
            .wrapping_add(self.kind());
        sum.wrapping_neg()
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let payload = self.payload();
        write!(
            f,
            ":{:0>2X}{:0>4X}{:0>2X}",
            payload.len(),
            self.address(),
            self.kind()
        )?;
        for byte in payload {
            write!(f, "{:0>2X}", byte)?;
        }
        write!(f, "{:0>2X}", self.checksum())
    }
}

/// Data records for every written run, with an extended linear address
/// record whenever the upper 16 address bits change, then end-of-file.
pub fn records<'a>(segments: impl Iterator<Item = &'a Segment>) -> Vec<Record> {
    let mut records = Vec::new();
    let mut upper = 0u16;

    for segment in segments {
        for run in segment.runs() {
            for (index, chunk) in run.bytes.chunks(MAX_DATA).enumerate() {
                let address = run.address + (index * MAX_DATA) as u32;
                let high = (address >> 16) as u16;
                if high != upper {
                    records.push(Record::ExtendedLinearAddress(high));
                    upper = high;
                }
                records.push(Record::Data {
                    address: address as u16,
                    bytes: chunk.to_vec(),
                });
            }
        }
    }

    records.push(Record::EndOfFile);
    records
}
