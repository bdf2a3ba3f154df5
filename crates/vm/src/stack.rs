//! Call frames and the bounded call stack.

use std::mem::size_of;

use crate::error::{ConfigError, Exhaustion, Fault};

/// One activation record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallFrame {
    /// Index of the executing function. `None` for the root frame.
    pub operator: Option<u16>,
    /// Position in the function's code.
    pub instruction_pointer: usize,
    /// Base offset of the frame's arena window.
    pub frame_pointer: usize,
}

impl CallFrame {
    /// True for the host's frame at the bottom of the stack.
    pub fn is_root(&self) -> bool {
        self.operator.is_none()
    }
}

/// Fixed-capacity frame slots plus the active-frame cursor.
///
/// Slot 0 is the root frame. Slots above the cursor hold stale frames from
/// earlier calls and are overwritten by the next push at that depth.
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    active: usize,
}

impl CallStack {
    /// Create a stack with `capacity` slots, clamped to at least one.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: vec![CallFrame::default(); capacity.max(1)],
            active: 0,
        }
    }

    /// Like [`CallStack::new`], reporting allocator refusal as an error.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        let capacity = capacity.max(1);
        let mut frames = Vec::new();
        frames
            .try_reserve_exact(capacity)
            .map_err(|_| ConfigError::Allocation {
                what: "call stack",
                bytes: capacity.saturating_mul(size_of::<CallFrame>()),
            })?;
        frames.resize(capacity, CallFrame::default());
        Ok(Self { frames, active: 0 })
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &CallFrame {
        &self.frames[self.active]
    }

    pub fn active_mut(&mut self) -> &mut CallFrame {
        &mut self.frames[self.active]
    }

    /// Frame at `index`, live or stale.
    pub fn frame(&self, index: usize) -> Option<&CallFrame> {
        self.frames.get(index)
    }

    /// Whether another frame can be pushed.
    pub fn has_room(&self) -> bool {
        self.active + 1 < self.frames.len()
    }

    /// Activate a fresh frame one slot above the cursor.
    pub fn push(&mut self, operator: u16, frame_pointer: usize) -> Result<usize, Exhaustion> {
        if !self.has_room() {
            return Err(Exhaustion::CallStack {
                capacity: self.capacity(),
            });
        }
        self.active += 1;
        self.frames[self.active] = CallFrame {
            operator: Some(operator),
            instruction_pointer: 0,
            frame_pointer,
        };
        Ok(self.active)
    }

    /// Move the cursor down to `index`. Indices above the cursor are ignored.
    pub fn unwind_to(&mut self, index: usize) {
        if index < self.active {
            self.active = index;
        }
    }

    /// Make `index` active again with its saved instruction pointer.
    ///
    /// `index` must not be above the cursor; the stack is left untouched if
    /// it is.
    pub fn restore(&mut self, index: usize, instruction_pointer: usize) -> Result<(), Fault> {
        if index > self.active {
            return Err(Fault::StackDesync {
                expected: index,
                actual: self.active,
            });
        }
        self.active = index;
        self.frames[index].instruction_pointer = instruction_pointer;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_root() {
        let stack = CallStack::new(4);
        assert_eq!(stack.capacity(), 4);
        assert_eq!(stack.active_index(), 0);
        assert!(stack.active().is_root());
    }

    #[test]
    fn zero_capacity_keeps_root_slot() {
        let stack = CallStack::new(0);
        assert_eq!(stack.capacity(), 1);
        assert!(!stack.has_room());
    }

    #[test]
    fn push_resets_instruction_pointer() {
        let mut stack = CallStack::new(3);
        let index = stack.push(7, 32).unwrap();
        stack.active_mut().instruction_pointer = 9;
        stack.unwind_to(0);

        assert_eq!(stack.push(2, 48), Ok(index));
        assert_eq!(
            *stack.active(),
            CallFrame {
                operator: Some(2),
                instruction_pointer: 0,
                frame_pointer: 48,
            }
        );
    }

    #[test]
    fn push_fails_when_full() {
        let mut stack = CallStack::new(2);
        stack.push(0, 0).unwrap();
        assert_eq!(stack.push(0, 0), Err(Exhaustion::CallStack { capacity: 2 }));
        assert_eq!(stack.active_index(), 1);
    }

    #[test]
    fn restore_sets_cursor_and_pointer() {
        let mut stack = CallStack::new(4);
        stack.push(0, 0).unwrap();
        stack.active_mut().instruction_pointer = 5;
        stack.push(1, 8).unwrap();

        stack.restore(1, 5).unwrap();
        assert_eq!(stack.active_index(), 1);
        assert_eq!(stack.active().instruction_pointer, 5);
        // Stale frame above the cursor survives until overwritten.
        assert_eq!(stack.frame(2).and_then(|f| f.operator), Some(1));
    }

    #[test]
    fn restore_above_cursor_is_rejected() {
        let mut stack = CallStack::new(4);
        stack.push(0, 0).unwrap();
        stack.active_mut().instruction_pointer = 5;

        assert_eq!(
            stack.restore(3, 9),
            Err(Fault::StackDesync {
                expected: 3,
                actual: 1
            })
        );
        assert_eq!(stack.active_index(), 1);
        assert_eq!(stack.active().instruction_pointer, 5);
    }

    #[test]
    fn try_new_clamps_and_reports_failure() {
        assert_eq!(CallStack::try_new(0).map(|s| s.capacity()), Ok(1));
        assert!(matches!(
            CallStack::try_new(usize::MAX),
            Err(ConfigError::Allocation {
                what: "call stack",
                ..
            })
        ));
    }
}
