//! Host-initiated, reentrant function invocation.
//!
//! [`Machine::invoke`] runs a function to completion as if it had been
//! called from inside the running program, then hands its outputs back as
//! owned buffers. An engine that is already executing may call it again for
//! a nested invocation; each level returns control to the frame that was
//! active when it started.

use log::{debug, error};
use reentry_common::FunctionDescriptor;

use crate::address::FrameWindow;
use crate::error::{Fault, InvokeError};
use crate::execute::Interpreter;
use crate::machine::Machine;

/// Executes instructions on a machine.
pub trait Engine {
    /// Run from the frame at `start` until the call stack unwinds back to
    /// `return_to`.
    ///
    /// On success the active frame index must equal `return_to`. Any error
    /// is treated as fatal by the caller.
    fn run(&mut self, machine: &mut Machine<'_>, start: usize, return_to: usize)
        -> Result<(), Fault>;
}

impl<'a> Machine<'a> {
    /// Invoke `function` with one buffer per declared input.
    ///
    /// Caller mistakes and resource exhaustion are reported before any
    /// state changes. A fault from `engine` poisons the machine; every later
    /// call returns [`InvokeError::Poisoned`].
    ///
    /// # Errors
    ///
    /// See [`InvokeError`] and [`InvokeError::kind`].
    pub fn invoke<E, I>(
        &mut self,
        engine: &mut E,
        function: u16,
        inputs: &[I],
    ) -> Result<Vec<Vec<u8>>, InvokeError>
    where
        E: Engine + ?Sized,
        I: AsRef<[u8]>,
    {
        if self.is_poisoned() {
            return Err(InvokeError::Poisoned);
        }
        let program = self.program();
        let descriptor = &program
            .function(function)
            .ok_or(InvokeError::UnknownFunction { function })?
            .descriptor;
        check_inputs(function, descriptor, inputs)?;

        let previous_index = self.call_stack().active_index();
        let saved_ip = self.call_stack().active().instruction_pointer;

        let window = self.push_frame(function, descriptor.size)?;
        let start = self.call_stack().active_index();
        debug!("invoke fn {function} in frame {start}, returning to {previous_index}");

        if let Err(fault) = self.write_inputs(window, descriptor, inputs) {
            return Err(self.fail(fault));
        }
        if let Err(fault) = engine.run(self, start, previous_index) {
            return Err(self.fail(fault));
        }

        let actual = self.call_stack().active_index();
        if actual != previous_index {
            return Err(self.fail(Fault::StackDesync {
                expected: previous_index,
                actual,
            }));
        }
        if let Err(fault) = self.call_stack_mut().restore(previous_index, saved_ip) {
            return Err(self.fail(fault));
        }

        let outputs = match self.read_outputs(window, descriptor) {
            Ok(outputs) => outputs,
            Err(fault) => return Err(self.fail(fault)),
        };
        self.release_frame(window);
        debug!("fn {function} returned {} outputs", outputs.len());
        Ok(outputs)
    }

    /// [`Machine::invoke`] with a fresh [`Interpreter`].
    pub fn call<I: AsRef<[u8]>>(
        &mut self,
        function: u16,
        inputs: &[I],
    ) -> Result<Vec<Vec<u8>>, InvokeError> {
        self.invoke(&mut Interpreter::new(), function, inputs)
    }

    fn write_inputs<I: AsRef<[u8]>>(
        &mut self,
        window: FrameWindow,
        descriptor: &FunctionDescriptor,
        inputs: &[I],
    ) -> Result<(), Fault> {
        for (input, slot) in inputs.iter().zip(&descriptor.inputs) {
            let address = window.resolve_slot(slot).map_err(Fault::SlotOutOfFrame)?;
            self.memory_mut().write(address.offset, input.as_ref())?;
        }
        Ok(())
    }

    /// Copy each output slot into its own buffer.
    fn read_outputs(
        &self,
        window: FrameWindow,
        descriptor: &FunctionDescriptor,
    ) -> Result<Vec<Vec<u8>>, Fault> {
        descriptor
            .outputs
            .iter()
            .map(|slot| {
                let address = window.resolve_slot(slot).map_err(Fault::SlotOutOfFrame)?;
                Ok(self.memory().read(address)?.to_vec())
            })
            .collect()
    }

    fn fail(&mut self, fault: Fault) -> InvokeError {
        error!("{fault}; machine poisoned");
        self.poison();
        InvokeError::Fault(fault)
    }
}

fn check_inputs<I: AsRef<[u8]>>(
    function: u16,
    descriptor: &FunctionDescriptor,
    inputs: &[I],
) -> Result<(), InvokeError> {
    descriptor
        .validate()
        .map_err(|source| InvokeError::Descriptor { function, source })?;

    if inputs.len() != descriptor.inputs.len() {
        return Err(InvokeError::InputCount {
            function,
            expected: descriptor.inputs.len(),
            actual: inputs.len(),
        });
    }
    for (index, (input, slot)) in inputs.iter().zip(&descriptor.inputs).enumerate() {
        let actual = input.as_ref().len();
        if actual != slot.size as usize {
            return Err(InvokeError::InputLength {
                function,
                index,
                expected: slot.size as usize,
                actual,
            });
        }
    }
    Ok(())
}
