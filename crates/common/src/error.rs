//! Decode and validation errors for reentry programs.

use std::fmt;

use thiserror::Error;

/// Which parameter list a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Input,
    Output,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Input => f.write_str("input"),
            SlotKind::Output => f.write_str("output"),
        }
    }
}

/// A function descriptor whose slots do not fit its declared frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The slot's byte range extends past the end of the frame.
    #[error("{kind} slot {index} at offset {offset} (size {size}) exceeds frame size {frame_size}")]
    SlotOutOfFrame {
        kind: SlotKind,
        index: usize,
        offset: u32,
        size: u32,
        frame_size: u32,
    },
}

/// Errors that occur while decoding instructions or program containers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode 0x00 is illegal and always rejected.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Opcode byte is not assigned.
    #[error("reserved opcode: {0:#04x}")]
    ReservedOpcode(u8),

    /// Instruction stream length is not a multiple of 8.
    #[error("invalid byte stream length: {0} (must be multiple of 8)")]
    InvalidLength(usize),

    /// Container does not start with the `RNTY` magic.
    #[error("bad magic: expected \"RNTY\"")]
    BadMagic,

    /// Container version is not understood by this decoder.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    /// Container ended before a field could be read.
    #[error("truncated container: need {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// Bytes left over after the last function.
    #[error("{0} trailing bytes after last function")]
    TrailingBytes(usize),

    /// A function descriptor failed validation.
    #[error("function {function}: {source}")]
    InvalidDescriptor {
        function: u16,
        #[source]
        source: DescriptorError,
    },
}
