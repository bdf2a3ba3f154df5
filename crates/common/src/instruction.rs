//! Instruction encoding and decoding.
//!
//! Every instruction is exactly 64 bits (8 bytes), encoded little-endian:
//! ```text
//! Byte 0:    opcode (u8)
//! Byte 1:    width (u8, only meaningful for CONST)
//! Bytes 2-3: a (u16, little-endian)
//! Bytes 4-5: b (u16, little-endian)
//! Bytes 6-7: c (u16, little-endian)
//! ```

use std::fmt;

use crate::error::DecodeError;
use crate::opcode::Opcode;

/// A single 64-bit instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The operation to perform.
    pub opcode: Opcode,
    /// Byte width for CONST. Zero for every other opcode.
    pub width: u8,
    /// First operand. Meaning depends on opcode.
    pub a: u16,
    /// Second operand. Meaning depends on opcode.
    pub b: u16,
    /// Third operand. Meaning depends on opcode.
    pub c: u16,
}

impl Instruction {
    /// Create a new instruction with a zero width byte.
    pub fn new(opcode: Opcode, a: u16, b: u16, c: u16) -> Self {
        Self::with_width(opcode, 0, a, b, c)
    }

    /// Create a new instruction with an explicit width byte.
    pub fn with_width(opcode: Opcode, width: u8, a: u16, b: u16, c: u16) -> Self {
        Self {
            opcode,
            width,
            a,
            b,
            c,
        }
    }

    /// CONST writing all four bytes of `value` at `dst`.
    pub fn const_u32(dst: u16, value: u32) -> Self {
        Self::with_width(
            Opcode::Const,
            4,
            dst,
            (value >> 16) as u16,
            (value & 0xFFFF) as u16,
        )
    }

    /// The 32-bit immediate carried by a CONST instruction.
    pub fn immediate(&self) -> u32 {
        ((self.b as u32) << 16) | (self.c as u32)
    }

    /// Encode this instruction to 8 bytes (little-endian).
    pub fn encode(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0] = self.opcode as u8;
        bytes[1] = self.width;
        bytes[2..4].copy_from_slice(&self.a.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.b.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.c.to_le_bytes());
        bytes
    }

    /// Decode 8 bytes into an instruction (little-endian).
    pub fn decode(bytes: [u8; 8]) -> Result<Self, DecodeError> {
        let opcode = Opcode::try_from(bytes[0])?;
        Ok(Self {
            opcode,
            width: bytes[1],
            a: u16::from_le_bytes([bytes[2], bytes[3]]),
            b: u16::from_le_bytes([bytes[4], bytes[5]]),
            c: u16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Disassembly form. Frame offsets print as `@n`, functions as `fn n`.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode.mnemonic();
        match self.opcode {
            Opcode::Const => write!(
                f,
                "{m} w{} @{} {:#010x}",
                self.width,
                self.a,
                self.immediate()
            ),
            Opcode::Copy => write!(f, "{m} @{} @{} {}", self.a, self.b, self.c),
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Eq | Opcode::Lt => {
                write!(f, "{m} @{} @{} @{}", self.a, self.b, self.c)
            }
            Opcode::Jmp => write!(f, "{m} {}", self.a),
            Opcode::Jz | Opcode::Jnz => write!(f, "{m} @{} {}", self.a, self.b),
            Opcode::Call | Opcode::Callback => {
                write!(f, "{m} fn {} @{} @{}", self.a, self.b, self.c)
            }
            Opcode::Trap => write!(f, "{m} {}", self.a),
            Opcode::Ret | Opcode::Nop => f.write_str(m),
        }
    }
}
