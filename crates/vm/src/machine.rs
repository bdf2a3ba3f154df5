//! Program instance state: arena, call stack and configuration.

use log::debug;
use reentry_common::Program;

use crate::address::FrameWindow;
use crate::error::{ConfigError, Exhaustion};
use crate::memory::Memory;
use crate::stack::{CallFrame, CallStack};

/// Default arena size: 1 MiB.
pub const DEFAULT_MEMORY_SIZE: usize = 1 << 20;

/// Default number of call stack slots, root frame included.
pub const DEFAULT_CALL_STACK_SIZE: usize = 1000;

/// Largest accepted arena size.
pub const MAX_MEMORY_SIZE: usize = isize::MAX as usize;

/// Largest accepted call stack size.
pub const MAX_CALL_STACK_SIZE: usize = isize::MAX as usize / std::mem::size_of::<CallFrame>();

/// What happens to a frame's arena window after the call returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FrameReclaim {
    /// Never lower the stack pointer. Arena usage only grows.
    #[default]
    Retain,
    /// Lower the stack pointer back to the frame pointer once outputs are
    /// copied out, if the frame is the most recent allocation.
    Release,
}

/// Sizing and policy for a [`Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    /// Arena capacity in bytes.
    pub memory_size: usize,
    /// Call stack slots, root frame included.
    pub call_stack_size: usize,
    pub reclaim: FrameReclaim,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            call_stack_size: DEFAULT_CALL_STACK_SIZE,
            reclaim: FrameReclaim::default(),
        }
    }
}

impl MachineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 {
            return Err(ConfigError::ZeroMemory);
        }
        if self.call_stack_size == 0 {
            return Err(ConfigError::ZeroCallStack);
        }
        if self.memory_size > MAX_MEMORY_SIZE {
            return Err(ConfigError::MemoryTooLarge {
                requested: self.memory_size,
                max: MAX_MEMORY_SIZE,
            });
        }
        if self.call_stack_size > MAX_CALL_STACK_SIZE {
            return Err(ConfigError::CallStackTooLarge {
                requested: self.call_stack_size,
                max: MAX_CALL_STACK_SIZE,
            });
        }
        Ok(())
    }
}

/// One running program instance.
///
/// Owns all mutable VM state. Every operation takes the machine explicitly,
/// so two machines never share an arena or call stack.
#[derive(Debug)]
pub struct Machine<'a> {
    program: &'a Program,
    memory: Memory,
    call_stack: CallStack,
    reclaim: FrameReclaim,
    poisoned: bool,
}

impl<'a> Machine<'a> {
    /// Create a machine with the default configuration.
    pub fn new(program: &'a Program) -> Self {
        let config = MachineConfig::default();
        Self {
            program,
            memory: Memory::new(config.memory_size),
            call_stack: CallStack::new(config.call_stack_size),
            reclaim: config.reclaim,
            poisoned: false,
        }
    }

    /// Create a machine sized by `config`.
    ///
    /// Rejects zero or oversized limits, and reports an allocator refusal
    /// instead of aborting.
    pub fn with_config(program: &'a Program, config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            program,
            memory: Memory::try_new(config.memory_size)?,
            call_stack: CallStack::try_new(config.call_stack_size)?,
            reclaim: config.reclaim,
            poisoned: false,
        })
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn call_stack_mut(&mut self) -> &mut CallStack {
        &mut self.call_stack
    }

    /// True once a fault has been raised; the machine then refuses all
    /// further invocations.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    /// Arena window of the frame at `index`, if it runs a known function.
    pub fn window(&self, index: usize) -> Option<FrameWindow> {
        let frame = self.call_stack.frame(index)?;
        let function = self.program.function(frame.operator?)?;
        Some(FrameWindow::new(
            frame.frame_pointer,
            function.descriptor.size as usize,
        ))
    }

    /// Arena window of the active frame.
    pub fn active_window(&self) -> Option<FrameWindow> {
        self.window(self.call_stack.active_index())
    }

    /// Allocate and activate a frame for `operator`.
    ///
    /// Checks call stack room and arena space before touching either, then
    /// takes `size` zeroed bytes at the stack pointer and pushes the frame.
    pub fn push_frame(&mut self, operator: u16, size: u32) -> Result<FrameWindow, Exhaustion> {
        if !self.call_stack.has_room() {
            return Err(Exhaustion::CallStack {
                capacity: self.call_stack.capacity(),
            });
        }
        let base = self.memory.reserve(size as usize)?;
        let index = self.call_stack.push(operator, base)?;

        let window = FrameWindow::new(base, size as usize);
        debug!(
            "push frame {index}: fn {operator} at [{}, {})",
            window.base(),
            window.end()
        );
        Ok(window)
    }

    /// Apply the reclaim policy to a frame that has returned.
    pub fn release_frame(&mut self, window: FrameWindow) {
        if self.reclaim == FrameReclaim::Release && window.end() == self.memory.stack_pointer() {
            self.memory.release_to(window.base());
        }
    }
}
