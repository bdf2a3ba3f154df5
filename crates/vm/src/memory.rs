//! The arena: one flat, fixed-capacity byte region per machine.
//!
//! Frames are carved out of the arena by advancing the stack pointer. All
//! access goes through bounds-checked [`Address`] ranges; nothing outside
//! this module holds a slice into the arena across a call.

use std::fmt;

use thiserror::Error;

use crate::error::{ConfigError, Exhaustion};

/// An absolute byte range in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub offset: usize,
    pub len: usize,
}

impl Address {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// One past the last byte, or `None` on overflow.
    pub fn end(&self) -> Option<usize> {
        self.offset.checked_add(self.len)
    }
}

/// An access that does not fit inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("arena access at offset {offset} (length {len}) exceeds capacity {capacity}")]
pub struct OutOfBounds {
    pub offset: usize,
    pub len: usize,
    pub capacity: usize,
}

/// Byte arena plus the stack pointer that allocates frames from it.
pub struct Memory {
    bytes: Vec<u8>,
    stack_pointer: usize,
}

impl Memory {
    /// Allocate a zero-filled arena of `capacity` bytes.
    ///
    /// Aborts on allocation failure like any `Vec`; see [`Memory::try_new`].
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            stack_pointer: 0,
        }
    }

    /// Allocate a zero-filled arena, reporting allocator refusal as an error.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(capacity)
            .map_err(|_| ConfigError::Allocation {
                what: "arena",
                bytes: capacity,
            })?;
        bytes.resize(capacity, 0);
        Ok(Self {
            bytes,
            stack_pointer: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Next unused offset.
    pub fn stack_pointer(&self) -> usize {
        self.stack_pointer
    }

    /// Bytes left above the stack pointer.
    pub fn available(&self) -> usize {
        self.capacity() - self.stack_pointer
    }

    /// Advance the stack pointer by `size`, zero the reserved bytes and
    /// return the old stack pointer.
    ///
    /// Leaves the arena untouched on failure.
    pub fn reserve(&mut self, size: usize) -> Result<usize, Exhaustion> {
        if size > self.available() {
            return Err(Exhaustion::Memory {
                requested: size,
                available: self.available(),
            });
        }
        let base = self.stack_pointer;
        self.stack_pointer += size;
        // Earlier frames may have left data at these offsets.
        self.bytes[base..self.stack_pointer].fill(0);
        Ok(base)
    }

    /// Move the stack pointer back down to `pointer`. Never raises it.
    pub fn release_to(&mut self, pointer: usize) {
        if pointer < self.stack_pointer {
            self.stack_pointer = pointer;
        }
    }

    fn check(&self, address: Address) -> Result<std::ops::Range<usize>, OutOfBounds> {
        match address.end() {
            Some(end) if end <= self.capacity() => Ok(address.offset..end),
            _ => Err(OutOfBounds {
                offset: address.offset,
                len: address.len,
                capacity: self.capacity(),
            }),
        }
    }

    /// Borrow the bytes at `address`.
    pub fn read(&self, address: Address) -> Result<&[u8], OutOfBounds> {
        let range = self.check(address)?;
        Ok(&self.bytes[range])
    }

    /// Copy `bytes` into the arena starting at `offset`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), OutOfBounds> {
        let range = self.check(Address::new(offset, bytes.len()))?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Fill `address` with zero bytes.
    pub fn zero(&mut self, address: Address) -> Result<(), OutOfBounds> {
        let range = self.check(address)?;
        self.bytes[range].fill(0);
        Ok(())
    }

    /// Copy `src.len` bytes from `src` to `dst_offset`. Ranges may overlap.
    pub fn copy(&mut self, src: Address, dst_offset: usize) -> Result<(), OutOfBounds> {
        let from = self.check(src)?;
        self.check(Address::new(dst_offset, src.len))?;
        self.bytes.copy_within(from, dst_offset);
        Ok(())
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("capacity", &self.capacity())
            .field("stack_pointer", &self.stack_pointer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_arena_is_zeroed() {
        let mem = Memory::new(16);
        assert_eq!(mem.capacity(), 16);
        assert_eq!(mem.stack_pointer(), 0);
        assert_eq!(mem.read(Address::new(0, 16)).unwrap(), &[0u8; 16]);
    }

    #[test]
    fn try_new_reports_allocation_failure() {
        assert_eq!(Memory::try_new(32).map(|m| m.capacity()), Ok(32));
        assert_eq!(
            Memory::try_new(usize::MAX).err(),
            Some(ConfigError::Allocation {
                what: "arena",
                bytes: usize::MAX
            })
        );
    }

    #[test]
    fn write_then_read() {
        let mut mem = Memory::new(8);
        mem.write(2, &[1, 2, 3]).unwrap();
        assert_eq!(mem.read(Address::new(1, 5)).unwrap(), &[0, 1, 2, 3, 0]);
    }

    #[test]
    fn accesses_past_capacity_fail() {
        let mut mem = Memory::new(8);
        let err = OutOfBounds {
            offset: 6,
            len: 4,
            capacity: 8,
        };
        assert_eq!(mem.read(Address::new(6, 4)), Err(err));
        assert_eq!(mem.write(6, &[0; 4]), Err(err));
        assert_eq!(mem.zero(Address::new(6, 4)), Err(err));
    }

    #[test]
    fn overflowing_address_fails() {
        let mem = Memory::new(8);
        assert!(mem.read(Address::new(usize::MAX, 2)).is_err());
    }

    #[test]
    fn reserve_advances_and_rejects_overflow() {
        let mut mem = Memory::new(10);
        assert_eq!(mem.reserve(4), Ok(0));
        assert_eq!(mem.reserve(4), Ok(4));
        assert_eq!(
            mem.reserve(4),
            Err(Exhaustion::Memory {
                requested: 4,
                available: 2
            })
        );
        assert_eq!(mem.stack_pointer(), 8);
    }

    #[test]
    fn reserve_zeroes_previous_contents() {
        let mut mem = Memory::new(8);
        mem.write(0, &[7; 8]).unwrap();
        assert_eq!(mem.reserve(4), Ok(0));
        assert_eq!(mem.read(Address::new(0, 8)).unwrap(), &[0, 0, 0, 0, 7, 7, 7, 7]);
    }

    #[test]
    fn release_only_lowers() {
        let mut mem = Memory::new(10);
        mem.reserve(6).unwrap();
        mem.release_to(8);
        assert_eq!(mem.stack_pointer(), 6);
        mem.release_to(2);
        assert_eq!(mem.stack_pointer(), 2);
    }

    #[test]
    fn zero_clears_range_only() {
        let mut mem = Memory::new(6);
        mem.write(0, &[9; 6]).unwrap();
        mem.zero(Address::new(1, 3)).unwrap();
        assert_eq!(mem.read(Address::new(0, 6)).unwrap(), &[9, 0, 0, 0, 9, 9]);
    }

    #[test]
    fn copy_handles_overlap() {
        let mut mem = Memory::new(6);
        mem.write(0, &[1, 2, 3, 4]).unwrap();
        mem.copy(Address::new(0, 4), 2).unwrap();
        assert_eq!(mem.read(Address::new(0, 6)).unwrap(), &[1, 2, 1, 2, 3, 4]);
        assert!(mem.copy(Address::new(0, 4), 4).is_err());
    }
}
