/// Receiver-side reassembly buffer.
///
/// Chunks are keyed by id; `total_chunks` is learned from the first stored
/// frame and every key stays below it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use crate::protocol::Frame;

/// Result of offering a validated frame to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// First copy of this chunk.
    New,
    /// Chunk already present; data replaced.
    Duplicate,
    /// Frame disagrees with the learned `total_chunks`; not stored.
    TotalMismatch { expected: u32 },
}

/// Ids absent from `0..total_chunks`, kept as inclusive ranges.
///
/// Holds at most one range per stored chunk plus one, however large the
/// advertised total is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingChunks {
    ranges: Vec<RangeInclusive<u32>>,
}

impl MissingChunks {
    pub fn from_ranges(ranges: impl IntoIterator<Item = RangeInclusive<u32>>) -> Self {
        Self {
            ranges: ranges.into_iter().filter(|r| !r.is_empty()).collect(),
        }
    }

    pub fn ranges(&self) -> &[RangeInclusive<u32>] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of missing ids.
    pub fn count(&self) -> u64 {
        self.ranges
            .iter()
            .map(|r| u64::from(*r.end()) - u64::from(*r.start()) + 1)
            .sum()
    }

    pub fn contains(&self, chunk_id: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(&chunk_id))
    }

    /// Missing ids in ascending order. Lazy; do not collect an unbounded gap.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }
}

/// `1, 4-9, 12`, or `none`.
impl fmt::Display for MissingChunks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ranges.is_empty() {
            return write!(f, "none");
        }
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if r.start() == r.end() {
                write!(f, "{}", r.start())?;
            } else {
                write!(f, "{}-{}", r.start(), r.end())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    chunks: BTreeMap<u32, Vec<u8>>,
    total_chunks: Option<u32>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a validated frame, overwriting any earlier copy of the same id.
    pub fn insert(&mut self, frame: Frame) -> Insert {
        match self.total_chunks {
            Some(expected) if expected != frame.total_chunks => {
                return Insert::TotalMismatch { expected };
            }
            Some(_) => {}
            None => self.total_chunks = Some(frame.total_chunks),
        }
        match self.chunks.insert(frame.chunk_id, frame.data) {
            Some(_) => Insert::Duplicate,
            None => Insert::New,
        }
    }

    pub fn total_chunks(&self) -> Option<u32> {
        self.total_chunks
    }

    /// Number of distinct chunks held.
    pub fn received(&self) -> usize {
        self.chunks.len()
    }

    pub fn get(&self, chunk_id: u32) -> Option<&[u8]> {
        self.chunks.get(&chunk_id).map(Vec::as_slice)
    }

    /// Returns true if every id `0..total_chunks` is present.
    pub fn is_complete(&self) -> bool {
        match self.total_chunks {
            Some(total) => self.chunks.len() == total as usize,
            None => false,
        }
    }

    /// Gaps in `0..total_chunks`. Empty while the total is unknown.
    pub fn missing(&self) -> MissingChunks {
        let Some(total) = self.total_chunks else {
            return MissingChunks::default();
        };
        let total = u64::from(total);
        let mut ranges = Vec::new();
        let mut next: u64 = 0;
        for &id in self.chunks.keys() {
            let id = u64::from(id);
            if id >= total {
                break;
            }
            if id > next {
                ranges.push(next as u32..=(id - 1) as u32);
            }
            next = id + 1;
        }
        if next < total {
            ranges.push(next as u32..=(total - 1) as u32);
        }
        MissingChunks { ranges }
    }

    /// Concatenate all chunks in id order. Returns the buffer back if incomplete.
    pub fn assemble(self) -> Result<Vec<u8>, Self> {
        if !self.is_complete() {
            return Err(self);
        }
        let len = self.chunks.values().map(Vec::len).sum();
        let mut payload = Vec::with_capacity(len);
        for data in self.chunks.into_values() {
            payload.extend_from_slice(&data);
        }
        Ok(payload)
    }
}
