//! Signal references
//!
//! A [`SigSpec`] is an ordered concatenation of bit ranges. Each range is either
//! a slice of a named signal or a constant bit-vector, and the total width of a
//! spec is the sum of its chunk widths. Chunk 0 holds the least significant
//! bits.

use crate::module::SignalId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Constant bit-vector, LSB first
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Const {
    pub bits: Vec<bool>,
}

impl Const {
    /// All-zero constant of the given width
    pub fn zeros(width: u32) -> Self {
        Self {
            bits: vec![false; width as usize],
        }
    }

    /// Constant holding the low `width` bits of `value`
    pub fn from_u64(value: u64, width: u32) -> Self {
        let bits = (0..width)
            .map(|i| i < 64 && (value >> i) & 1 == 1)
            .collect();
        Self { bits }
    }

    pub fn width(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Value of the low 64 bits
    pub fn as_u64(&self) -> u64 {
        self.bits
            .iter()
            .take(64)
            .enumerate()
            .fold(0u64, |acc, (i, &b)| if b { acc | (1 << i) } else { acc })
    }

    pub fn is_zero(&self) -> bool {
        self.bits.iter().all(|b| !b)
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'b", self.bits.len())?;
        for b in self.bits.iter().rev() {
            write!(f, "{}", if *b { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// One contiguous range of a [`SigSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigChunk {
    /// `width` bits of `signal` starting at bit `offset`
    Wire {
        signal: SignalId,
        offset: u32,
        width: u32,
    },
    /// Constant bits
    Const(Const),
}

impl SigChunk {
    pub fn width(&self) -> u32 {
        match self {
            SigChunk::Wire { width, .. } => *width,
            SigChunk::Const(c) => c.width(),
        }
    }

    pub fn signal(&self) -> Option<SignalId> {
        match self {
            SigChunk::Wire { signal, .. } => Some(*signal),
            SigChunk::Const(_) => None,
        }
    }
}

/// A single bit of a [`SigSpec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigBit {
    Wire(SignalId, u32),
    Const(bool),
}

/// Ordered concatenation of signal slices and constants
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigSpec {
    chunks: Vec<SigChunk>,
}

impl SigSpec {
    /// Empty (zero-width) spec
    pub fn new() -> Self {
        Self::default()
    }

    /// `width` bits of `signal` starting at bit 0
    pub fn wire(signal: SignalId, width: u32) -> Self {
        Self::slice(signal, 0, width)
    }

    pub fn slice(signal: SignalId, offset: u32, width: u32) -> Self {
        let mut spec = Self::new();
        spec.push(SigChunk::Wire {
            signal,
            offset,
            width,
        });
        spec
    }

    pub fn constant(value: Const) -> Self {
        let mut spec = Self::new();
        spec.push(SigChunk::Const(value));
        spec
    }

    pub fn zeros(width: u32) -> Self {
        Self::constant(Const::zeros(width))
    }

    /// Rebuild a spec from individual bits, merging contiguous runs
    pub fn from_bits(bits: impl IntoIterator<Item = SigBit>) -> Self {
        let mut spec = Self::new();
        for bit in bits {
            match bit {
                SigBit::Wire(signal, offset) => spec.push(SigChunk::Wire {
                    signal,
                    offset,
                    width: 1,
                }),
                SigBit::Const(b) => spec.push(SigChunk::Const(Const { bits: vec![b] })),
            }
        }
        spec
    }

    /// Append a chunk at the most significant end, merging with the previous
    /// chunk when the two are contiguous.
    pub fn push(&mut self, chunk: SigChunk) {
        if chunk.width() == 0 {
            return;
        }
        if let Some(last) = self.chunks.last_mut() {
            match (last, &chunk) {
                (
                    SigChunk::Wire {
                        signal: last_sig,
                        offset: last_off,
                        width: last_width,
                    },
                    SigChunk::Wire {
                        signal,
                        offset,
                        width,
                    },
                ) if *last_sig == *signal && *last_off + *last_width == *offset => {
                    *last_width += *width;
                    return;
                }
                (SigChunk::Const(last), SigChunk::Const(c)) => {
                    last.bits.extend_from_slice(&c.bits);
                    return;
                }
                _ => {}
            }
        }
        self.chunks.push(chunk);
    }

    /// Append another spec at the most significant end
    pub fn append(&mut self, other: &SigSpec) {
        for chunk in &other.chunks {
            self.push(chunk.clone());
        }
    }

    /// Zero-extend to `width` bits; wider specs are returned unchanged
    pub fn zero_extended(&self, width: u32) -> SigSpec {
        let mut spec = self.clone();
        let current = spec.width();
        if current < width {
            spec.push(SigChunk::Const(Const::zeros(width - current)));
        }
        spec
    }

    pub fn chunks(&self) -> &[SigChunk] {
        &self.chunks
    }

    pub fn width(&self) -> u32 {
        self.chunks.iter().map(SigChunk::width).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_fully_const(&self) -> bool {
        self.chunks.iter().all(|c| matches!(c, SigChunk::Const(_)))
    }

    pub fn is_fully_zero(&self) -> bool {
        self.chunks
            .iter()
            .all(|c| matches!(c, SigChunk::Const(k) if k.is_zero()))
    }

    /// Distinct signals referenced, in order of first appearance
    pub fn signals(&self) -> Vec<SignalId> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            if let Some(sig) = chunk.signal() {
                if !out.contains(&sig) {
                    out.push(sig);
                }
            }
        }
        out
    }

    /// Signal backing the least significant bits, if any
    pub fn first_signal(&self) -> Option<SignalId> {
        self.chunks.iter().find_map(SigChunk::signal)
    }

    pub fn bits(&self) -> Vec<SigBit> {
        let mut out = Vec::with_capacity(self.width() as usize);
        for chunk in &self.chunks {
            match chunk {
                SigChunk::Wire {
                    signal,
                    offset,
                    width,
                } => out.extend((*offset..*offset + *width).map(|i| SigBit::Wire(*signal, i))),
                SigChunk::Const(c) => out.extend(c.bits.iter().map(|b| SigBit::Const(*b))),
            }
        }
        out
    }
}
