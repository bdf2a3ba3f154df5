//! Static metadata for callable functions.
//!
//! A [`FunctionDescriptor`] is created once when a program is loaded and is
//! shared read-only by every call to that function. Its slots are
//! frame-relative: they only become arena offsets once a frame pointer is
//! known.

use crate::error::{DescriptorError, SlotKind};

/// Frame-relative location and size of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    /// Byte offset from the frame pointer.
    pub offset: u32,
    /// Length in bytes.
    pub size: u32,
}

impl SlotDescriptor {
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    /// One past the last frame-relative byte, or `None` on overflow.
    pub fn end(&self) -> Option<u32> {
        self.offset.checked_add(self.size)
    }
}

/// Frame layout of a function: total size plus ordered input and output
/// slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// Bytes reserved in the arena for each activation.
    pub size: u32,
    /// Input slots in declaration order.
    pub inputs: Vec<SlotDescriptor>,
    /// Output slots in declaration order.
    pub outputs: Vec<SlotDescriptor>,
}

impl FunctionDescriptor {
    pub fn new(size: u32, inputs: Vec<SlotDescriptor>, outputs: Vec<SlotDescriptor>) -> Self {
        Self {
            size,
            inputs,
            outputs,
        }
    }

    /// Check that every slot lies inside `[0, size)`.
    ///
    /// Slots may overlap each other; a function that reads an input and
    /// writes the result in place is legal.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let lists = [
            (SlotKind::Input, &self.inputs),
            (SlotKind::Output, &self.outputs),
        ];
        for (kind, slots) in lists {
            for (index, slot) in slots.iter().enumerate() {
                let fits = slot.end().is_some_and(|end| end <= self.size);
                if !fits {
                    return Err(DescriptorError::SlotOutOfFrame {
                        kind,
                        index,
                        offset: slot.offset,
                        size: slot.size,
                        frame_size: self.size,
                    });
                }
            }
        }
        Ok(())
    }

    /// Total bytes across all input slots.
    pub fn input_size(&self) -> u64 {
        self.inputs.iter().map(|s| s.size as u64).sum()
    }

    /// Total bytes across all output slots.
    pub fn output_size(&self) -> u64 {
        self.outputs.iter().map(|s| s.size as u64).sum()
    }
}
