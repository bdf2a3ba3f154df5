//! Program container: a table of functions, each a descriptor plus code.
//!
//! Binary files (.rbc) use this little-endian layout:
//! ```text
//! magic "RNTY" | version u16 | function count u16
//! per function:
//!   size u32 | input count u16 | output count u16 | code length u32
//!   inputs  (offset u32, size u32) * input count
//!   outputs (offset u32, size u32) * output count
//!   code    8-byte instructions * code length
//! ```

use crate::descriptor::{FunctionDescriptor, SlotDescriptor};
use crate::error::DecodeError;
use crate::instruction::Instruction;

/// Leading bytes of every encoded program.
pub const MAGIC: [u8; 4] = *b"RNTY";

/// Container version written by [`Program::encode`].
pub const VERSION: u16 = 1;

/// One callable unit: its frame layout and its instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Function {
    pub descriptor: FunctionDescriptor,
    pub code: Vec<Instruction>,
}

impl Function {
    pub fn new(descriptor: FunctionDescriptor, code: Vec<Instruction>) -> Self {
        Self { descriptor, code }
    }
}

/// A loaded program. Functions are addressed by their index in the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub functions: Vec<Function>,
}

impl Program {
    /// Create a new program from a function table.
    pub fn new(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    /// Look up a function by index.
    pub fn function(&self, index: u16) -> Option<&Function> {
        self.functions.get(index as usize)
    }

    /// Number of functions in the table.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if the program has no functions.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Encode the program to its binary container form.
    ///
    /// Counts are truncated to their field widths; programs built in memory
    /// with more than `u16::MAX` functions or slots do not round-trip.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.functions.len() as u16).to_le_bytes());

        for function in &self.functions {
            let desc = &function.descriptor;
            bytes.extend_from_slice(&desc.size.to_le_bytes());
            bytes.extend_from_slice(&(desc.inputs.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&(desc.outputs.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&(function.code.len() as u32).to_le_bytes());
            for slot in desc.inputs.iter().chain(&desc.outputs) {
                bytes.extend_from_slice(&slot.offset.to_le_bytes());
                bytes.extend_from_slice(&slot.size.to_le_bytes());
            }
            for instr in &function.code {
                bytes.extend_from_slice(&instr.encode());
            }
        }
        bytes
    }

    /// Decode a binary container, validating every descriptor.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(bytes);

        if reader.take(4)? != MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = reader.u16()?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let count = reader.u16()?;
        let mut functions = Vec::with_capacity(count as usize);
        for index in 0..count {
            let size = reader.u32()?;
            let input_count = reader.u16()?;
            let output_count = reader.u16()?;
            let code_len = reader.u32()?;

            let inputs = reader.slots(input_count)?;
            let outputs = reader.slots(output_count)?;
            let descriptor = FunctionDescriptor::new(size, inputs, outputs);
            descriptor
                .validate()
                .map_err(|source| DecodeError::InvalidDescriptor {
                    function: index,
                    source,
                })?;

            let code = decode_instructions(reader.take_instructions(code_len)?)?;
            functions.push(Function::new(descriptor, code));
        }

        if reader.remaining() != 0 {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        Ok(Self { functions })
    }
}

/// Decode a raw instruction stream with no container framing.
///
/// The byte slice length must be a multiple of 8.
pub fn decode_instructions(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    if !bytes.len().is_multiple_of(8) {
        return Err(DecodeError::InvalidLength(bytes.len()));
    }
    let mut instructions = Vec::with_capacity(bytes.len() / 8);
    for chunk in bytes.chunks_exact(8) {
        let arr: [u8; 8] = chunk.try_into().expect("chunks_exact guarantees 8 bytes");
        instructions.push(Instruction::decode(arr)?);
    }
    Ok(instructions)
}

/// Cursor over container bytes.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_instructions(&mut self, count: u32) -> Result<&'a [u8], DecodeError> {
        let needed = (count as usize)
            .checked_mul(8)
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: usize::MAX,
            })?;
        self.take(needed)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn slots(&mut self, count: u16) -> Result<Vec<SlotDescriptor>, DecodeError> {
        let mut slots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let offset = self.u32()?;
            let size = self.u32()?;
            slots.push(SlotDescriptor::new(offset, size));
        }
        Ok(slots)
    }
}
