//! Shared program model for the reentry VM.
//!
//! This crate provides the static data every other crate consumes:
//!
//! - [`SlotDescriptor`] / [`FunctionDescriptor`]: frame layouts
//! - [`Opcode`] / [`Instruction`]: the 64-bit reference instruction set
//! - [`Function`] / [`Program`]: the loaded function table and its binary form
//! - [`DecodeError`] / [`DescriptorError`]: load-time errors
//!
//! Nothing here touches a running machine; descriptors are immutable once
//! loaded and are shared by every call.

pub mod descriptor;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod program;

// Re-export commonly used types at the crate root.
pub use descriptor::{FunctionDescriptor, SlotDescriptor};
pub use error::{DecodeError, DescriptorError, SlotKind};
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use program::{Function, Program};
