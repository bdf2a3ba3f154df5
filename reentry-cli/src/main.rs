//! Reentry CLI: inspect container files and invoke functions.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Usage, I/O, decode or input parsing error
//! - 2: Invocation rejected (bad inputs or resources exhausted)
//! - 3: Execution fault

mod commands;
mod hex;

use std::process;

use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() {
    let (args, verbosity) = split_verbosity(std::env::args().skip(1).collect());
    init_logging(verbosity);

    if args.is_empty() {
        print_usage();
        process::exit(1);
    }

    let result = match args[0].as_str() {
        "invoke" => commands::invoke(&args[1..]),
        "inspect" => commands::inspect(&args[1..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

/// Remove `-v`/`-vv` flags and count them.
fn split_verbosity(args: Vec<String>) -> (Vec<String>, usize) {
    let mut verbosity = 0;
    let rest = args
        .into_iter()
        .filter(|arg| match arg.as_str() {
            "-v" => {
                verbosity += 1;
                false
            }
            "-vv" => {
                verbosity += 2;
                false
            }
            _ => true,
        })
        .collect();
    (rest, verbosity)
}

fn init_logging(verbosity: usize) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("warning: logging disabled: {e}");
    }
}

fn print_usage() {
    eprintln!("Usage: reentry [-v|-vv] <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  invoke <program.rbc> <function> [hex ...]   Invoke a function, print outputs as hex");
    eprintln!("  inspect <program.rbc>                       Print descriptors and disassembly");
    eprintln!();
    eprintln!("Invoke options:");
    eprintln!("  --memory-size N   Arena size in bytes (default 1048576)");
    eprintln!("  --call-depth N    Call stack slots, root included (default 1000)");
    eprintln!("  --reclaim         Release frame memory after each return");
    eprintln!("  --fuel N          Fault after N instructions");
}
