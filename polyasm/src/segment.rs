use bit_vec::BitVec;

use crate::{
    error::{AsmError, AsmResult},
    table::SymbolTable,
};

pub const PAGE_SIZE: usize = 256;
const PAGE_MASK: u32 = !(PAGE_SIZE as u32 - 1);

/// 256 bytes of output with a bit per byte recording whether it was written.
#[derive(Debug, Clone)]
pub struct Page {
    base: u32,
    data: [u8; PAGE_SIZE],
    used: BitVec,
}

impl Page {
    fn new(base: u32) -> Self {
        Self {
            base,
            data: [0; PAGE_SIZE],
            used: BitVec::from_elem(PAGE_SIZE, false),
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn is_used(&self, offset: usize) -> bool {
        self.used.get(offset).unwrap_or(false)
    }

    pub fn byte(&self, offset: usize) -> Option<u8> {
        self.is_used(offset).then(|| self.data[offset])
    }

    /// Contiguous written stretches, in address order.
    pub fn runs(&self) -> Vec<Run<'_>> {
        let mut runs = Vec::new();
        let mut start = None;
        for offset in 0..=PAGE_SIZE {
            match (start, offset < PAGE_SIZE && self.is_used(offset)) {
                (None, true) => start = Some(offset),
                (Some(first), false) => {
                    runs.push(Run {
                        address: self.base + first as u32,
                        bytes: &self.data[first..offset],
                    });
                    start = None;
                }
                _ => {}
            }
        }
        runs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run<'a> {
    pub address: u32,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

/// A named address space: a program counter plus sparse paged storage.
///
/// The PC counts in processor address units. Storage addresses are bytes;
/// the assembler does the scaling.
#[derive(Debug, Clone)]
pub struct Segment {
    name: String,
    pages: Vec<Page>,
    cache: Option<usize>,
    pc: u32,
    code_gen_offset: i64,
    generate_output: bool,
    ds_low: Option<u32>,
    ds_high: Option<u32>,
}

impl Segment {
    pub fn new(name: &str, generate_output: bool) -> Self {
        Self {
            name: name.to_owned(),
            pages: Vec::new(),
            cache: None,
            pc: 0,
            code_gen_offset: 0,
            generate_output,
            ds_low: None,
            ds_high: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn generates_output(&self) -> bool {
        self.generate_output
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: i64) -> AsmResult<()> {
        self.pc = u32::try_from(pc)
            .map_err(|_| AsmError::Range(format!("address {:#x} is outside 0..=0xFFFFFFFF", pc)))?;
        Ok(())
    }

    pub fn advance(&mut self, units: u32) -> AsmResult<()> {
        self.pc = self.advanced(units)?;
        Ok(())
    }

    /// The PC `units` further on, without moving it.
    pub fn advanced(&self, units: u32) -> AsmResult<u32> {
        self.pc
            .checked_add(units)
            .ok_or_else(|| AsmError::Range("program counter overflow".into()))
    }

    pub fn code_gen_offset(&self) -> i64 {
        self.code_gen_offset
    }

    pub fn set_code_gen_offset(&mut self, offset: i64) {
        self.code_gen_offset = offset;
    }

    /// Address the code at the PC will run at.
    pub fn run_pc(&self) -> i64 {
        self.pc as i64 + self.code_gen_offset
    }

    fn page_index(&mut self, base: u32) -> usize {
        if let Some(index) = self.cache {
            if self.pages[index].base == base {
                return index;
            }
        }
        let index = match self.pages.binary_search_by_key(&base, Page::base) {
            Ok(index) => index,
            Err(index) => {
                self.pages.insert(index, Page::new(base));
                index
            }
        };
        self.cache = Some(index);
        index
    }

    pub fn write_bytes(&mut self, address: u32, bytes: &[u8]) -> AsmResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        // The end of every write must itself be an address.
        u32::try_from(bytes.len())
            .ok()
            .and_then(|len| address.checked_add(len))
            .ok_or_else(|| AsmError::Range(format!("data at {:#x} runs past the end of memory", address)))?;

        let mut address = address;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let base = address & PAGE_MASK;
            let offset = (address - base) as usize;
            let count = remaining.len().min(PAGE_SIZE - offset);

            let index = self.page_index(base);
            let page = &mut self.pages[index];
            page.data[offset..offset + count].copy_from_slice(&remaining[..count]);
            for bit in offset..offset + count {
                page.used.set(bit, true);
            }

            remaining = &remaining[count..];
            address = address.wrapping_add(count as u32);
        }
        Ok(())
    }

    /// Note a define-space region. Storage is untouched.
    pub fn reserve_space(&mut self, address: u32, count: u32) {
        if count == 0 {
            return;
        }
        let end = address.saturating_add(count);
        self.ds_low = Some(self.ds_low.map_or(address, |low| low.min(address)));
        self.ds_high = Some(self.ds_high.map_or(end, |high| high.max(end)));
    }

    pub fn reserved(&self) -> Option<(u32, u32)> {
        self.ds_low.zip(self.ds_high)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn runs(&self) -> impl Iterator<Item = Run<'_>> {
        self.pages.iter().flat_map(Page::runs)
    }

    pub fn byte_at(&self, address: u32) -> Option<u8> {
        let base = address & PAGE_MASK;
        let index = self.pages.binary_search_by_key(&base, Page::base).ok()?;
        self.pages[index].byte((address - base) as usize)
    }

    /// Lowest written address and one past the highest.
    pub fn extent(&self) -> Option<(u32, u32)> {
        let mut runs = self.runs();
        let first = runs.next()?;
        let last = runs.last().unwrap_or(first);
        let end = last.address.saturating_add(last.bytes.len() as u32);
        Some((first.address, end))
    }

    pub fn used_bytes(&self) -> usize {
        self.pages
            .iter()
            .map(|page| page.used.iter().filter(|used| *used).count())
            .sum()
    }
}

/// Every segment of the run, in creation order.
#[derive(Debug, Clone, Default)]
pub struct Segments {
    segments: Vec<Segment>,
    by_name: SymbolTable<SegmentId>,
}

impl Segments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.by_name.clear();
    }

    /// Find or create `name`. The flag is true when an existing segment was
    /// created with a different output intent.
    pub fn select(&mut self, name: &str, generate_output: bool) -> (SegmentId, bool) {
        if let Some(id) = self.by_name.get(name).copied() {
            let mismatch = self.segments[id.0].generate_output != generate_output;
            return (id, mismatch);
        }
        let id = SegmentId(self.segments.len());
        self.segments.push(Segment::new(name, generate_output));
        self.by_name.insert(name, id);
        (id, false)
    }

    pub fn get(&self, id: SegmentId) -> &Segment {
        &self.segments[id.0]
    }

    pub fn get_mut(&mut self, id: SegmentId) -> &mut Segment {
        &mut self.segments[id.0]
    }

    pub fn by_name(&self, name: &str) -> Option<&Segment> {
        self.by_name.get(name).map(|id| &self.segments[id.0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
