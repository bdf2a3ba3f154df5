//! Frame-relative address resolution.
//!
//! Every arena location a frame uses is named as an offset into that frame's
//! window and turned into an absolute [`Address`] here, with overflow and
//! window checks.

use reentry_common::SlotDescriptor;
use thiserror::Error;

use crate::memory::Address;

/// A frame-relative range that does not fit inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("frame offset {offset} (length {len}) outside frame of {size} bytes")]
pub struct OutOfFrame {
    pub offset: usize,
    pub len: usize,
    pub size: usize,
}

/// The arena range `[base, base + size)` reserved for one activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameWindow {
    base: usize,
    size: usize,
}

impl FrameWindow {
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// The frame pointer.
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// One past the last byte of the window, saturating at `usize::MAX`.
    pub fn end(&self) -> usize {
        self.base.saturating_add(self.size)
    }

    /// The whole window as an arena address.
    pub fn address(&self) -> Address {
        Address::new(self.base, self.size)
    }

    /// True if the two windows share at least one byte.
    pub fn overlaps(&self, other: &FrameWindow) -> bool {
        self.base < other.end() && other.base < self.end()
    }

    /// Resolve `len` bytes at frame-relative `offset`.
    pub fn resolve(&self, offset: usize, len: usize) -> Result<Address, OutOfFrame> {
        let start = offset
            .checked_add(len)
            .filter(|&end| end <= self.size)
            .and_then(|_| self.base.checked_add(offset));
        match start {
            Some(start) => Ok(Address::new(start, len)),
            None => Err(OutOfFrame {
                offset,
                len,
                size: self.size,
            }),
        }
    }

    /// Resolve a parameter slot to its final arena address.
    pub fn resolve_slot(&self, slot: &SlotDescriptor) -> Result<Address, OutOfFrame> {
        self.resolve(slot.offset as usize, slot.size as usize)
    }
}
