//! Reentrant stack VM: frames, arena, and host-initiated invocation.
//!
//! A [`Machine`] owns one program instance: a fixed-size byte arena carved
//! into frames by a monotonic stack pointer, and a bounded call stack whose
//! slot 0 is the host's root frame. [`Machine::invoke`] runs one function to
//! completion and returns copies of its outputs. The reference
//! [`Interpreter`] may call back into `invoke` while executing, so the
//! protocol nests to any depth the call stack allows.
//!
//! # Usage
//!
//! ```
//! use reentry_common::{Function, FunctionDescriptor, Instruction, Opcode, Program, SlotDescriptor};
//! use reentry_vm::invoke;
//!
//! // fn(x: i32, y: i32) -> i32 { x + y }
//! let add = Function::new(
//!     FunctionDescriptor::new(
//!         12,
//!         vec![SlotDescriptor::new(0, 4), SlotDescriptor::new(4, 4)],
//!         vec![SlotDescriptor::new(8, 4)],
//!     ),
//!     vec![
//!         Instruction::new(Opcode::Add, 8, 0, 4),
//!         Instruction::new(Opcode::Ret, 0, 0, 0),
//!     ],
//! );
//! let program = Program::new(vec![add]);
//!
//! let outputs = invoke(&program, 0, &[2i32.to_le_bytes(), 40i32.to_le_bytes()]).unwrap();
//! assert_eq!(outputs, vec![42i32.to_le_bytes().to_vec()]);
//! ```

pub mod address;
pub mod error;
pub mod execute;
pub mod invoke;
pub mod machine;
pub mod memory;
pub mod stack;

pub use address::{FrameWindow, OutOfFrame};
pub use error::{ConfigError, ErrorKind, Exhaustion, Fault, InvokeError};
pub use execute::Interpreter;
pub use invoke::Engine;
pub use machine::{FrameReclaim, Machine, MachineConfig};
pub use memory::{Address, Memory, OutOfBounds};
pub use stack::{CallFrame, CallStack};

use reentry_common::Program;

/// Invoke one function on a fresh machine with the default configuration.
///
/// # Errors
///
/// Returns [`InvokeError`] if the inputs do not match the function's
/// descriptor, resources run out, or execution faults.
pub fn invoke<I: AsRef<[u8]>>(
    program: &Program,
    function: u16,
    inputs: &[I],
) -> Result<Vec<Vec<u8>>, InvokeError> {
    Machine::new(program).call(function, inputs)
}
