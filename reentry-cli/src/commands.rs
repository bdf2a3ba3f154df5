//! CLI command implementations.

use std::fs;

use log::info;
use reentry_common::{FunctionDescriptor, Program, SlotDescriptor};
use reentry_vm::{ErrorKind, FrameReclaim, Interpreter, Machine, MachineConfig};

use crate::hex;

/// Options accepted by `invoke` after the positional arguments.
#[derive(Debug, Default, PartialEq)]
struct InvokeOptions {
    config: MachineConfig,
    fuel: Option<u64>,
    inputs: Vec<Vec<u8>>,
}

/// Invoke one function and print its outputs, one hex line each.
pub fn invoke(args: &[String]) -> Result<(), i32> {
    if args.len() < 2 {
        eprintln!("error: invoke requires a program file and a function index");
        eprintln!("Usage: reentry invoke <program.rbc> <function> [hex ...] [options]");
        return Err(1);
    }

    let input = &args[0];
    let function: u16 = args[1].parse().map_err(|_| {
        eprintln!("error: invalid function index '{}'", args[1]);
        1
    })?;
    let options = parse_invoke_options(&args[2..])?;
    let program = read_binary(input)?;

    let mut machine = Machine::with_config(&program, options.config).map_err(|e| {
        eprintln!("error: {e}");
        1
    })?;
    let mut engine = match options.fuel {
        Some(fuel) => Interpreter::with_fuel(fuel),
        None => Interpreter::new(),
    };

    match machine.invoke(&mut engine, function, &options.inputs) {
        Ok(outputs) => {
            info!(
                "fn {function}: {} instructions, {} arena bytes used",
                engine.executed(),
                machine.memory().stack_pointer()
            );
            for output in &outputs {
                println!("{}", hex::encode(output));
            }
            Ok(())
        }
        Err(e) => match e.kind() {
            ErrorKind::CallerContract | ErrorKind::ResourceExhaustion => {
                eprintln!("error: {e}");
                Err(2)
            }
            ErrorKind::Fatal => {
                eprintln!("internal error: {e}");
                Err(3)
            }
        },
    }
}

/// Print every function's descriptor followed by its disassembly.
pub fn inspect(args: &[String]) -> Result<(), i32> {
    if args.is_empty() {
        eprintln!("error: inspect requires an input file");
        eprintln!("Usage: reentry inspect <program.rbc>");
        return Err(1);
    }

    let program = read_binary(&args[0])?;
    print!("{}", render_program(&program));
    Ok(())
}

// --- Helpers ---

/// Read and decode a container file.
fn read_binary(path: &str) -> Result<Program, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{path}': {e}");
        1
    })?;

    Program::decode(&bytes).map_err(|e| {
        eprintln!("error: invalid program: {e}");
        1
    })
}

fn parse_invoke_options(args: &[String]) -> Result<InvokeOptions, i32> {
    let mut options = InvokeOptions::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--reclaim" => options.config.reclaim = FrameReclaim::Release,
            flag @ ("--memory-size" | "--call-depth" | "--fuel") => {
                let value = args.get(i + 1).ok_or_else(|| {
                    eprintln!("error: {flag} requires a value");
                    1
                })?;
                let n: u64 = value.parse().map_err(|_| {
                    eprintln!("error: {flag} expects a number, got '{value}'");
                    1
                })?;
                let size = || {
                    usize::try_from(n).map_err(|_| {
                        eprintln!("error: {flag} value {n} does not fit this platform");
                        1
                    })
                };
                match flag {
                    "--memory-size" => options.config.memory_size = size()?,
                    "--call-depth" => options.config.call_stack_size = size()?,
                    _ => options.fuel = Some(n),
                }
                i += 1;
            }
            other if other.starts_with("--") => {
                eprintln!("error: unknown option '{other}'");
                return Err(1);
            }
            text => {
                let bytes = hex::decode(text).map_err(|e| {
                    eprintln!("error: input {}: {e}", options.inputs.len());
                    1
                })?;
                options.inputs.push(bytes);
            }
        }
        i += 1;
    }
    Ok(options)
}

fn render_slots(slots: &[SlotDescriptor]) -> String {
    let parts: Vec<String> = slots
        .iter()
        .map(|s| format!("{}+{}", s.offset, s.size))
        .collect();
    format!("[{}]", parts.join(", "))
}

fn render_descriptor(index: usize, descriptor: &FunctionDescriptor) -> String {
    format!(
        "fn {index}: size {}, inputs {} ({} bytes), outputs {} ({} bytes)",
        descriptor.size,
        render_slots(&descriptor.inputs),
        descriptor.input_size(),
        render_slots(&descriptor.outputs),
        descriptor.output_size()
    )
}

fn render_program(program: &Program) -> String {
    let mut out = String::new();
    for (index, function) in program.functions.iter().enumerate() {
        out.push_str(&render_descriptor(index, &function.descriptor));
        out.push('\n');
        for (at, instr) in function.code.iter().enumerate() {
            out.push_str(&format!("  {at:04}  {instr}\n"));
        }
    }
    out
}
