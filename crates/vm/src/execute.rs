//! Reference execution engine and opcode dispatch.

use log::trace;
use reentry_common::{Function, Instruction, Opcode};

use crate::address::FrameWindow;
use crate::error::Fault;
use crate::invoke::Engine;
use crate::machine::Machine;
use crate::memory::Address;

/// Interpreter for the reference instruction set.
///
/// The active frame's instruction pointer names the instruction being
/// executed and advances once it completes. A frame suspended in CALL or
/// CALLBACK therefore still points at that instruction, which is how RET
/// finds where to deliver outputs.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    fuel: Option<u64>,
    executed: u64,
}

/// Where the current instruction runs.
#[derive(Debug, Clone, Copy)]
struct Site {
    function: u16,
    at: usize,
    window: FrameWindow,
}

impl Site {
    fn resolve(&self, offset: usize, len: usize) -> Result<Address, Fault> {
        self.window
            .resolve(offset, len)
            .map_err(|source| Fault::OutOfFrame {
                function: self.function,
                at: self.at,
                source,
            })
    }

    fn read_i32(&self, machine: &Machine<'_>, offset: u16) -> Result<i32, Fault> {
        let bytes = machine.memory().read(self.resolve(offset as usize, 4)?)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(buf))
    }

    fn read_u8(&self, machine: &Machine<'_>, offset: u16) -> Result<u8, Fault> {
        let bytes = machine.memory().read(self.resolve(offset as usize, 1)?)?;
        Ok(bytes[0])
    }

    fn write(&self, machine: &mut Machine<'_>, offset: u16, bytes: &[u8]) -> Result<(), Fault> {
        let address = self.resolve(offset as usize, bytes.len())?;
        machine.memory_mut().write(address.offset, bytes)?;
        Ok(())
    }
}

impl Interpreter {
    /// An interpreter with no instruction budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// An interpreter that faults after `fuel` instructions.
    pub fn with_fuel(fuel: u64) -> Self {
        Self {
            fuel: Some(fuel),
            executed: 0,
        }
    }

    /// Instructions executed so far, nested invocations included.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    fn charge(&mut self, site: &Site) -> Result<(), Fault> {
        if self.fuel.is_some_and(|fuel| self.executed >= fuel) {
            return Err(Fault::FuelExhausted {
                function: site.function,
                at: site.at,
            });
        }
        self.executed += 1;
        Ok(())
    }

    /// Execute one instruction. Returns true once control is back at
    /// `return_to`.
    fn step(
        &mut self,
        machine: &mut Machine<'_>,
        site: Site,
        instr: Instruction,
        return_to: usize,
    ) -> Result<bool, Fault> {
        match instr.opcode {
            Opcode::Nop => advance(machine),

            // Data movement
            Opcode::Const => {
                let width = instr.width as usize;
                if !matches!(width, 1 | 2 | 4) {
                    return Err(Fault::InvalidWidth {
                        function: site.function,
                        at: site.at,
                        width: instr.width,
                    });
                }
                let bytes = instr.immediate().to_le_bytes();
                site.write(machine, instr.a, &bytes[..width])?;
                advance(machine);
            }
            Opcode::Copy => {
                let len = instr.c as usize;
                let src = site.resolve(instr.b as usize, len)?;
                let dst = site.resolve(instr.a as usize, len)?;
                machine.memory_mut().copy(src, dst.offset)?;
                advance(machine);
            }

            // Arithmetic
            Opcode::Add => self.arith(machine, site, instr, i32::wrapping_add)?,
            Opcode::Sub => self.arith(machine, site, instr, i32::wrapping_sub)?,
            Opcode::Mul => self.arith(machine, site, instr, i32::wrapping_mul)?,
            Opcode::Div => {
                if site.read_i32(machine, instr.c)? == 0 {
                    return Err(Fault::DivisionByZero {
                        function: site.function,
                        at: site.at,
                    });
                }
                self.arith(machine, site, instr, i32::wrapping_div)?;
            }

            // Comparison
            Opcode::Eq => self.compare(machine, site, instr, |x, y| x == y)?,
            Opcode::Lt => self.compare(machine, site, instr, |x, y| x < y)?,

            // Control flow
            Opcode::Jmp => jump(machine, instr.a),
            Opcode::Jz | Opcode::Jnz => {
                let flag = site.read_u8(machine, instr.a)? != 0;
                if flag == (instr.opcode == Opcode::Jnz) {
                    jump(machine, instr.b);
                } else {
                    advance(machine);
                }
            }

            // Calls
            Opcode::Call => self.call(machine, site, instr)?,
            Opcode::Callback => self.callback(machine, site, instr)?,
            Opcode::Ret => return self.ret(machine, site, return_to),

            Opcode::Trap => {
                return Err(Fault::Trap {
                    function: site.function,
                    at: site.at,
                    code: instr.a,
                })
            }
        }
        Ok(false)
    }

    fn arith(
        &mut self,
        machine: &mut Machine<'_>,
        site: Site,
        instr: Instruction,
        op: fn(i32, i32) -> i32,
    ) -> Result<(), Fault> {
        let x = site.read_i32(machine, instr.b)?;
        let y = site.read_i32(machine, instr.c)?;
        site.write(machine, instr.a, &op(x, y).to_le_bytes())?;
        advance(machine);
        Ok(())
    }

    fn compare(
        &mut self,
        machine: &mut Machine<'_>,
        site: Site,
        instr: Instruction,
        op: fn(i32, i32) -> bool,
    ) -> Result<(), Fault> {
        let x = site.read_i32(machine, instr.b)?;
        let y = site.read_i32(machine, instr.c)?;
        site.write(machine, instr.a, &[op(x, y) as u8])?;
        advance(machine);
        Ok(())
    }

    fn callee<'p>(machine: &Machine<'p>, site: Site, index: u16) -> Result<&'p Function, Fault> {
        machine
            .program()
            .function(index)
            .ok_or(Fault::UnknownFunction {
                function: site.function,
                at: site.at,
                index,
            })
    }

    /// In-engine call: push the callee and keep looping.
    fn call(&mut self, machine: &mut Machine<'_>, site: Site, instr: Instruction) -> Result<(), Fault> {
        let callee = Self::callee(machine, site, instr.a)?;
        let descriptor = &callee.descriptor;

        let mut sources = Vec::with_capacity(descriptor.inputs.len());
        let mut cursor = instr.b as usize;
        for slot in &descriptor.inputs {
            sources.push(site.resolve(cursor, slot.size as usize)?);
            cursor += slot.size as usize;
        }

        let window = machine
            .push_frame(instr.a, descriptor.size)
            .map_err(|source| Fault::Exhausted {
                function: site.function,
                at: site.at,
                source,
            })?;
        for (src, slot) in sources.into_iter().zip(&descriptor.inputs) {
            let dst = window.resolve_slot(slot).map_err(Fault::SlotOutOfFrame)?;
            machine.memory_mut().copy(src, dst.offset)?;
        }
        Ok(())
    }

    /// Reentrant call through the invocation protocol.
    fn callback(
        &mut self,
        machine: &mut Machine<'_>,
        site: Site,
        instr: Instruction,
    ) -> Result<(), Fault> {
        let callee = Self::callee(machine, site, instr.a)?;

        let mut inputs = Vec::with_capacity(callee.descriptor.inputs.len());
        let mut cursor = instr.b as usize;
        for slot in &callee.descriptor.inputs {
            let address = site.resolve(cursor, slot.size as usize)?;
            inputs.push(machine.memory().read(address)?.to_vec());
            cursor += slot.size as usize;
        }

        let outputs = machine
            .invoke(self, instr.a, &inputs)
            .map_err(|source| Fault::Callback {
                function: site.function,
                at: site.at,
                source: Box::new(source),
            })?;

        let mut cursor = instr.c as usize;
        for bytes in &outputs {
            let address = site.resolve(cursor, bytes.len())?;
            machine.memory_mut().write(address.offset, bytes)?;
            cursor += bytes.len();
        }
        advance(machine);
        Ok(())
    }

    fn ret(&mut self, machine: &mut Machine<'_>, site: Site, return_to: usize) -> Result<bool, Fault> {
        let index = machine.call_stack().active_index();
        let caller_index = index
            .checked_sub(1)
            .ok_or(Fault::NoActiveFunction { frame: index })?;

        if caller_index == return_to {
            // Outputs are collected by whoever started this run.
            machine.call_stack_mut().unwind_to(caller_index);
            return Ok(true);
        }

        let caller = machine
            .call_stack()
            .frame(caller_index)
            .copied()
            .ok_or(Fault::NoActiveFunction {
                frame: caller_index,
            })?;
        let caller_fn_index = caller.operator.ok_or(Fault::NoActiveFunction {
            frame: caller_index,
        })?;
        let caller_fn = machine
            .program()
            .function(caller_fn_index)
            .ok_or(Fault::NoActiveFunction {
                frame: caller_index,
            })?;
        let bad_return = Fault::BadReturn {
            function: caller_fn_index,
            at: caller.instruction_pointer,
        };
        let call = caller_fn
            .code
            .get(caller.instruction_pointer)
            .filter(|i| i.opcode == Opcode::Call)
            .ok_or(bad_return)?;
        let callee = Self::callee(machine, site, site.function)?;

        let caller_site = Site {
            function: caller_fn_index,
            at: caller.instruction_pointer,
            window: FrameWindow::new(caller.frame_pointer, caller_fn.descriptor.size as usize),
        };
        let mut cursor = call.c as usize;
        for slot in &callee.descriptor.outputs {
            let src = site.window.resolve_slot(slot).map_err(Fault::SlotOutOfFrame)?;
            let dst = caller_site.resolve(cursor, slot.size as usize)?;
            machine.memory_mut().copy(src, dst.offset)?;
            cursor += slot.size as usize;
        }

        machine.call_stack_mut().unwind_to(caller_index);
        machine.release_frame(site.window);
        advance(machine);
        trace!("return from fn {} to frame {caller_index}", site.function);
        Ok(false)
    }
}

impl Engine for Interpreter {
    fn run(
        &mut self,
        machine: &mut Machine<'_>,
        start: usize,
        return_to: usize,
    ) -> Result<(), Fault> {
        let program = machine.program();
        let actual = machine.call_stack().active_index();
        if actual != start {
            return Err(Fault::StackDesync {
                expected: start,
                actual,
            });
        }

        loop {
            let index = machine.call_stack().active_index();
            let frame = *machine.call_stack().active();
            let function = frame
                .operator
                .ok_or(Fault::NoActiveFunction { frame: index })?;
            let code = program
                .function(function)
                .ok_or(Fault::NoActiveFunction { frame: index })?;

            let site = Site {
                function,
                at: frame.instruction_pointer,
                window: FrameWindow::new(frame.frame_pointer, code.descriptor.size as usize),
            };
            let instr = *code
                .code
                .get(site.at)
                .ok_or(Fault::EndOfCode {
                    function,
                    at: site.at,
                })?;
            self.charge(&site)?;
            trace!("frame {index} fn {function} @{}: {instr}", site.at);

            if self.step(machine, site, instr, return_to)? {
                return Ok(());
            }
        }
    }
}

fn advance(machine: &mut Machine<'_>) {
    machine.call_stack_mut().active_mut().instruction_pointer += 1;
}

fn jump(machine: &mut Machine<'_>, target: u16) {
    machine.call_stack_mut().active_mut().instruction_pointer = target as usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokeError;
    use reentry_common::{FunctionDescriptor, Program, SlotDescriptor};

    fn ins(op: Opcode, a: u16, b: u16, c: u16) -> Instruction {
        Instruction::new(op, a, b, c)
    }

    fn ret() -> Instruction {
        ins(Opcode::Ret, 0, 0, 0)
    }

    /// fn(i32, i32) -> i32 with the frame laid out as [x, y, result].
    fn binary(code: Vec<Instruction>) -> Function {
        Function::new(
            FunctionDescriptor::new(
                12,
                vec![SlotDescriptor::new(0, 4), SlotDescriptor::new(4, 4)],
                vec![SlotDescriptor::new(8, 4)],
            ),
            code,
        )
    }

    fn run_binary(code: Vec<Instruction>, x: i32, y: i32) -> Result<i32, InvokeError> {
        let program = Program::new(vec![binary(code)]);
        let mut machine = Machine::new(&program);
        let out = machine.call(0, &[x.to_le_bytes(), y.to_le_bytes()])?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&out[0]);
        Ok(i32::from_le_bytes(buf))
    }

    #[test]
    fn arithmetic_ops() {
        assert_eq!(run_binary(vec![ins(Opcode::Add, 8, 0, 4), ret()], 2, 3), Ok(5));
        assert_eq!(run_binary(vec![ins(Opcode::Sub, 8, 0, 4), ret()], 2, 3), Ok(-1));
        assert_eq!(run_binary(vec![ins(Opcode::Mul, 8, 0, 4), ret()], -4, 3), Ok(-12));
        assert_eq!(run_binary(vec![ins(Opcode::Div, 8, 0, 4), ret()], 7, 2), Ok(3));
    }

    #[test]
    fn arithmetic_wraps() {
        assert_eq!(
            run_binary(vec![ins(Opcode::Add, 8, 0, 4), ret()], i32::MAX, 1),
            Ok(i32::MIN)
        );
        assert_eq!(
            run_binary(vec![ins(Opcode::Div, 8, 0, 4), ret()], i32::MIN, -1),
            Ok(i32::MIN)
        );
    }

    #[test]
    fn division_by_zero_faults() {
        assert_eq!(
            run_binary(vec![ins(Opcode::Div, 8, 0, 4), ret()], 1, 0),
            Err(InvokeError::Fault(Fault::DivisionByZero {
                function: 0,
                at: 0
            }))
        );
    }

    #[test]
    fn comparisons_write_one_byte() {
        // result slot is 4 bytes; comparison writes only the low byte.
        assert_eq!(run_binary(vec![ins(Opcode::Lt, 8, 0, 4), ret()], 1, 2), Ok(1));
        assert_eq!(run_binary(vec![ins(Opcode::Lt, 8, 0, 4), ret()], 2, 1), Ok(0));
        assert_eq!(run_binary(vec![ins(Opcode::Eq, 8, 0, 4), ret()], 5, 5), Ok(1));
    }

    #[test]
    fn const_widths() {
        let code = vec![
            Instruction::const_u32(8, 0x1122_3344),
            Instruction::with_width(Opcode::Const, 1, 8, 0, 0xAA),
            ret(),
        ];
        assert_eq!(run_binary(code, 0, 0), Ok(0x1122_33AA));

        let bad = vec![Instruction::with_width(Opcode::Const, 3, 8, 0, 1), ret()];
        assert_eq!(
            run_binary(bad, 0, 0),
            Err(InvokeError::Fault(Fault::InvalidWidth {
                function: 0,
                at: 0,
                width: 3
            }))
        );
    }

    #[test]
    fn conditional_jumps() {
        // result = x < y ? 1 : 2
        let code = vec![
            ins(Opcode::Lt, 8, 0, 4),
            ins(Opcode::Jz, 8, 4, 0),
            Instruction::const_u32(8, 1),
            ret(),
            Instruction::const_u32(8, 2),
            ret(),
        ];
        assert_eq!(run_binary(code.clone(), 1, 9), Ok(1));
        assert_eq!(run_binary(code, 9, 1), Ok(2));
    }

    #[test]
    fn countdown_loop() {
        // result = x * y by repeated addition.
        // Frame: [x, y, result, one, flag, zero]
        let multiply = Function::new(
            FunctionDescriptor::new(
                24,
                vec![SlotDescriptor::new(0, 4), SlotDescriptor::new(4, 4)],
                vec![SlotDescriptor::new(8, 4)],
            ),
            vec![
                Instruction::const_u32(12, 1),
                Instruction::const_u32(8, 0),
                ins(Opcode::Eq, 16, 0, 20),
                ins(Opcode::Jnz, 16, 7, 0),
                ins(Opcode::Add, 8, 8, 4),
                ins(Opcode::Sub, 0, 0, 12),
                ins(Opcode::Jmp, 2, 0, 0),
                ret(),
            ],
        );
        let program = Program::new(vec![multiply]);
        let mut machine = Machine::new(&program);
        for (x, y) in [(3i32, 5i32), (0, 5), (7, -2)] {
            let out = machine.call(0, &[x.to_le_bytes(), y.to_le_bytes()]).unwrap();
            assert_eq!(out, vec![(x * y).to_le_bytes().to_vec()]);
        }
    }

    #[test]
    fn operand_outside_frame_faults() {
        let code = vec![ins(Opcode::Add, 10, 0, 4), ret()];
        assert!(matches!(
            run_binary(code, 1, 1),
            Err(InvokeError::Fault(Fault::OutOfFrame {
                function: 0,
                at: 0,
                ..
            }))
        ));
    }

    #[test]
    fn running_off_the_end_faults() {
        assert_eq!(
            run_binary(vec![ins(Opcode::Nop, 0, 0, 0)], 0, 0),
            Err(InvokeError::Fault(Fault::EndOfCode {
                function: 0,
                at: 1
            }))
        );
    }

    #[test]
    fn trap_faults_with_code() {
        assert_eq!(
            run_binary(vec![ins(Opcode::Trap, 42, 0, 0)], 0, 0),
            Err(InvokeError::Fault(Fault::Trap {
                function: 0,
                at: 0,
                code: 42
            }))
        );
    }

    #[test]
    fn fuel_limits_execution() {
        let program = Program::new(vec![binary(vec![ins(Opcode::Jmp, 0, 0, 0)])]);
        let mut machine = Machine::new(&program);
        let mut interp = Interpreter::with_fuel(100);
        let err = machine
            .invoke(&mut interp, 0, &[[0u8; 4], [0u8; 4]])
            .unwrap_err();
        assert_eq!(
            err,
            InvokeError::Fault(Fault::FuelExhausted {
                function: 0,
                at: 0
            })
        );
        assert_eq!(interp.executed(), 100);
    }

    #[test]
    fn in_vm_call_delivers_outputs() {
        // fn 0: result = add(x, y) + x via CALL into fn 1.
        // Frame of fn 0: [x, y, result, tmp]
        let caller = Function::new(
            FunctionDescriptor::new(
                16,
                vec![SlotDescriptor::new(0, 4), SlotDescriptor::new(4, 4)],
                vec![SlotDescriptor::new(8, 4)],
            ),
            vec![
                ins(Opcode::Call, 1, 0, 12),
                ins(Opcode::Add, 8, 12, 0),
                ret(),
            ],
        );
        let adder = binary(vec![ins(Opcode::Add, 8, 0, 4), ret()]);
        let program = Program::new(vec![caller, adder]);
        let mut machine = Machine::new(&program);

        let out = machine
            .call(0, &[10i32.to_le_bytes(), 5i32.to_le_bytes()])
            .unwrap();
        assert_eq!(out, vec![25i32.to_le_bytes().to_vec()]);
        assert_eq!(machine.call_stack().active_index(), 0);
        assert_eq!(machine.memory().stack_pointer(), 16 + 12);
    }

    #[test]
    fn return_into_non_call_faults() {
        let program = Program::new(vec![binary(vec![ret()])]);
        let mut machine = Machine::new(&program);
        // A suspended caller resting on RET instead of CALL.
        machine.push_frame(0, 12).unwrap();
        machine.push_frame(0, 12).unwrap();
        let start = machine.call_stack().active_index();
        let err = Interpreter::new().run(&mut machine, start, 0).unwrap_err();
        assert_eq!(err, Fault::BadReturn { function: 0, at: 0 });
    }
}
