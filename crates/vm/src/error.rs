//! Errors raised by the machine.
//!
//! Two families live here. [`InvokeError`] is what a host sees from
//! [`Machine::invoke`](crate::Machine::invoke); most of its variants are
//! rejections detected before any state changed. [`Fault`] is raised by an
//! execution engine after state has changed and is always fatal: the machine
//! that produced it is poisoned.

use reentry_common::DescriptorError;
use thiserror::Error;

use crate::address::OutOfFrame;
use crate::memory::OutOfBounds;

/// A frame could not be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Exhaustion {
    /// Every call stack slot above the active one is in use.
    #[error("call stack exhausted ({capacity} frames)")]
    CallStack { capacity: usize },

    /// The arena has fewer free bytes than the frame needs.
    #[error("arena exhausted: frame needs {requested} bytes, {available} available")]
    Memory { requested: usize, available: usize },
}

/// Unrecoverable failure during execution.
///
/// Every variant that happens at an instruction carries the function index
/// and instruction position (`at`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// CALL or CALLBACK names a function that is not in the program.
    #[error("unknown function {index} called at instruction {at} of function {function}")]
    UnknownFunction { function: u16, at: usize, index: u16 },

    /// Instruction pointer moved past the end of the function's code.
    #[error("function {function} ran past its code at instruction {at}")]
    EndOfCode { function: u16, at: usize },

    /// An operand addressed bytes outside the executing frame.
    #[error("function {function} at instruction {at}: {source}")]
    OutOfFrame {
        function: u16,
        at: usize,
        #[source]
        source: OutOfFrame,
    },

    /// A descriptor slot did not fit its frame while marshalling.
    #[error("slot resolution failed: {0}")]
    SlotOutOfFrame(#[source] OutOfFrame),

    /// An arena access fell outside the arena.
    #[error(transparent)]
    Memory(#[from] OutOfBounds),

    /// CONST with a width other than 1, 2 or 4.
    #[error("invalid CONST width {width} at instruction {at} of function {function}")]
    InvalidWidth { function: u16, at: usize, width: u8 },

    /// Integer division by zero.
    #[error("division by zero at instruction {at} of function {function}")]
    DivisionByZero { function: u16, at: usize },

    /// An in-VM CALL could not allocate its frame.
    #[error("function {function} at instruction {at}: {source}")]
    Exhausted {
        function: u16,
        at: usize,
        #[source]
        source: Exhaustion,
    },

    /// A reentrant CALLBACK did not complete.
    #[error("callback at instruction {at} of function {function} failed: {source}")]
    Callback {
        function: u16,
        at: usize,
        #[source]
        source: Box<InvokeError>,
    },

    /// RET found its caller suspended on something other than CALL.
    #[error("return into function {function} at instruction {at}, which is not a CALL")]
    BadReturn { function: u16, at: usize },

    /// TRAP instruction.
    #[error("trap {code} at instruction {at} of function {function}")]
    Trap { function: u16, at: usize, code: u16 },

    /// The engine's instruction budget ran out.
    #[error("fuel exhausted at instruction {at} of function {function}")]
    FuelExhausted { function: u16, at: usize },

    /// The active frame has no function attached (the root frame).
    #[error("frame {frame} has no function to execute")]
    NoActiveFunction { frame: usize },

    /// The active frame index is not the one the protocol expected.
    #[error("call stack desynchronized: expected frame {expected}, found {actual}")]
    StackDesync { expected: usize, actual: usize },
}

/// Broad classification of an [`InvokeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller passed something that does not match the function.
    CallerContract,
    /// No room for another frame.
    ResourceExhaustion,
    /// The machine must not be used again.
    Fatal,
}

/// Errors returned from an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// No function at this index.
    #[error("unknown function {function}")]
    UnknownFunction { function: u16 },

    /// Number of input buffers differs from the declared inputs.
    #[error("function {function} expects {expected} inputs, got {actual}")]
    InputCount {
        function: u16,
        expected: usize,
        actual: usize,
    },

    /// An input buffer differs in length from its slot.
    #[error("function {function} input {index} expects {expected} bytes, got {actual}")]
    InputLength {
        function: u16,
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// The function's descriptor has a slot outside its frame.
    #[error("function {function}: {source}")]
    Descriptor {
        function: u16,
        #[source]
        source: DescriptorError,
    },

    /// Call stack or arena is full.
    #[error(transparent)]
    Exhausted(#[from] Exhaustion),

    /// Execution faulted; the machine is now poisoned.
    #[error("execution fault: {0}")]
    Fault(#[from] Fault),

    /// An earlier fault poisoned this machine.
    #[error("machine is poisoned by an earlier fault")]
    Poisoned,
}

impl InvokeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvokeError::UnknownFunction { .. }
            | InvokeError::InputCount { .. }
            | InvokeError::InputLength { .. }
            | InvokeError::Descriptor { .. } => ErrorKind::CallerContract,
            InvokeError::Exhausted(_) => ErrorKind::ResourceExhaustion,
            InvokeError::Fault(_) | InvokeError::Poisoned => ErrorKind::Fatal,
        }
    }

    /// True if the machine that returned this error must not be reused.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Invalid [`MachineConfig`](crate::MachineConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("memory size must be non-zero")]
    ZeroMemory,

    #[error("call stack size must be non-zero")]
    ZeroCallStack,

    #[error("memory size {requested} exceeds the maximum of {max} bytes")]
    MemoryTooLarge { requested: usize, max: usize },

    #[error("call stack size {requested} exceeds the maximum of {max} frames")]
    CallStackTooLarge { requested: usize, max: usize },

    /// The allocator refused the arena or call stack.
    #[error("cannot allocate {bytes} bytes for the {what}")]
    Allocation { what: &'static str, bytes: usize },
}
