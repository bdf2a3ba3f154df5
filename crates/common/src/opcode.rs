//! Opcode definitions for the reference instruction set.
//!
//! Operands `a`, `b` and `c` are frame-relative byte offsets unless an
//! opcode says otherwise. Integer operations work on little-endian `i32`.

use crate::error::DecodeError;

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute ensures each variant has a stable byte value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Data movement
    /// Write the low `width` bytes of `(b << 16) | c` at `a`.
    Const = 0x01,
    /// Copy `c` bytes from `b` to `a`.
    Copy = 0x02,

    // Arithmetic
    /// `a = b + c` (wrapping).
    Add = 0x10,
    /// `a = b - c` (wrapping).
    Sub = 0x11,
    /// `a = b * c` (wrapping).
    Mul = 0x12,
    /// `a = b / c`. Division by zero faults.
    Div = 0x13,

    // Comparison
    /// One byte at `a`: 1 if `b == c`.
    Eq = 0x20,
    /// One byte at `a`: 1 if `b < c`.
    Lt = 0x21,

    // Control flow
    /// Jump to instruction `a`.
    Jmp = 0x30,
    /// Jump to instruction `b` if the byte at `a` is zero.
    Jz = 0x31,
    /// Jump to instruction `b` if the byte at `a` is non-zero.
    Jnz = 0x32,

    // Calls
    /// Call function `a` inside the running engine. Inputs are read
    /// back-to-back from `b`, outputs written back-to-back to `c`.
    Call = 0x40,
    /// Like CALL, but routed through the host invocation protocol.
    Callback = 0x41,
    /// Return to the calling frame.
    Ret = 0x42,

    // VM control
    /// Raise a fault carrying code `a`.
    Trap = 0xFE,
    /// No operation.
    Nop = 0xFF,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 16] = [
    Opcode::Const,
    Opcode::Copy,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Eq,
    Opcode::Lt,
    Opcode::Jmp,
    Opcode::Jz,
    Opcode::Jnz,
    Opcode::Call,
    Opcode::Callback,
    Opcode::Ret,
    Opcode::Trap,
    Opcode::Nop,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Err(DecodeError::IllegalOpcode),

            0x01 => Ok(Opcode::Const),
            0x02 => Ok(Opcode::Copy),

            0x10 => Ok(Opcode::Add),
            0x11 => Ok(Opcode::Sub),
            0x12 => Ok(Opcode::Mul),
            0x13 => Ok(Opcode::Div),

            0x20 => Ok(Opcode::Eq),
            0x21 => Ok(Opcode::Lt),

            0x30 => Ok(Opcode::Jmp),
            0x31 => Ok(Opcode::Jz),
            0x32 => Ok(Opcode::Jnz),

            0x40 => Ok(Opcode::Call),
            0x41 => Ok(Opcode::Callback),
            0x42 => Ok(Opcode::Ret),

            0xFE => Ok(Opcode::Trap),
            0xFF => Ok(Opcode::Nop),

            other => Err(DecodeError::ReservedOpcode(other)),
        }
    }
}

impl Opcode {
    /// Return the assembly mnemonic for this opcode.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Const => "CONST",
            Opcode::Copy => "COPY",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Eq => "EQ",
            Opcode::Lt => "LT",
            Opcode::Jmp => "JMP",
            Opcode::Jz => "JZ",
            Opcode::Jnz => "JNZ",
            Opcode::Call => "CALL",
            Opcode::Callback => "CALLBACK",
            Opcode::Ret => "RET",
            Opcode::Trap => "TRAP",
            Opcode::Nop => "NOP",
        }
    }
}
