//! Chunk VM CLI (spec.md §6.3): `assemble`, `run`, `debug`, `profile`,
//! `flamegraph`.

use chunkvm::assembler::{assemble, Program};
use chunkvm::chunk::Chunk;
use chunkvm::debug::StepDebugger;
use chunkvm::interpreter::gateway::DefaultGateway;
use chunkvm::interpreter::{Engine, EngineConfig};
use chunkvm::profiler::SharedProfiler;
use chunkvm::state::ProgramState;
use clap::{Parser, Subcommand};
use num_bigint::BigInt;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chunkvm", about = "Assembler and execution engine for the chunk VM")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a textual program into a chunk list.
    Assemble {
        /// Input assembly file; stdin if omitted.
        input: Option<PathBuf>,
        /// Output chunk-list file; stdout if omitted.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Assemble (if text) or load (if a chunk list) and execute.
    Run {
        /// Input file; stdin if omitted.
        input: Option<PathBuf>,
        /// Maximum cycles before giving up.
        #[arg(long)]
        step_limit: Option<u64>,
    },
    /// Execute with an interactive breakpoint/watchpoint debugger attached.
    Debug {
        /// Input file.
        input: PathBuf,
        /// Chunk indices to break at.
        #[arg(short = 'b', long = "break")]
        breakpoints: Vec<usize>,
        /// Memory addresses to watch.
        #[arg(short = 'w', long = "watch")]
        watchpoints: Vec<i64>,
    },
    /// Execute with a profiler attached; print per-opcode counts.
    Profile {
        /// Input file.
        input: PathBuf,
    },
    /// Execute with a profiler attached; print flamegraph-format samples.
    Flamegraph {
        /// Input file.
        input: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::from(1)
        }
    }
}

fn run(command: Command) -> Result<ExitCode, String> {
    match command {
        Command::Assemble { input, output } => cmd_assemble(input, output),
        Command::Run { input, step_limit } => cmd_run(input, step_limit),
        Command::Debug {
            input,
            breakpoints,
            watchpoints,
        } => cmd_debug(input, breakpoints, watchpoints),
        Command::Profile { input } => cmd_profile(input, false),
        Command::Flamegraph { input } => cmd_profile(input, true),
    }
}

fn read_input(path: &Option<PathBuf>) -> Result<String, String> {
    match path {
        Some(p) => std::fs::read_to_string(p).map_err(|e| format!("reading {}: {e}", p.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map_err(|e| e.to_string())?;
            Ok(buf)
        }
    }
}

fn write_output(path: &Option<PathBuf>, text: &str) -> Result<(), String> {
    match path {
        Some(p) => std::fs::write(p, text).map_err(|e| format!("writing {}: {e}", p.display())),
        None => {
            print!("{text}");
            io::stdout().flush().map_err(|e| e.to_string())
        }
    }
}

fn cmd_assemble(input: Option<PathBuf>, output: Option<PathBuf>) -> Result<ExitCode, String> {
    let source = read_input(&input)?;
    match assemble(&source) {
        Ok(program) => {
            write_output(&output, &program.to_text())?;
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            eprintln!("assembler error: {e}");
            Ok(ExitCode::from(2))
        }
    }
}

/// Loads `text` as a chunk list if every non-comment line is a decimal
/// integer, otherwise assembles it as assembly source (spec.md §6.3 `run`).
fn load_program(text: &str) -> Result<Program, String> {
    let looks_like_chunk_list = text.lines().all(|line| {
        let without_comment = line.find('#').map(|i| &line[..i]).unwrap_or(line);
        let trimmed = without_comment.trim();
        trimmed.is_empty() || trimmed.chars().all(|c| c.is_ascii_digit())
    });
    if looks_like_chunk_list {
        Program::from_chunk_list(text).map_err(|e| e.to_string())
    } else {
        assemble(text).map_err(|e| e.to_string())
    }
}

fn chunks_of(program: &Program) -> Arc<[Chunk]> {
    program.chunks().to_vec().into()
}

/// Renders output-queue values the way a human expects: printable ASCII as
/// a character, anything else as its decimal digits, matching both the
/// `countdown.asm` ("321") and `block_demo.asm` ("HI") scenarios in
/// spec.md §8.
fn render_output(values: &[BigInt]) -> String {
    use num_traits::ToPrimitive;
    let mut out = String::new();
    for v in values {
        match v.to_u32().filter(|&c| (0x20..=0x7e).contains(&c)) {
            Some(code) => out.push(char::from_u32(code).expect("checked printable ascii range")),
            None => out.push_str(&v.to_string()),
        }
    }
    out
}

fn cmd_run(input: Option<PathBuf>, step_limit: Option<u64>) -> Result<ExitCode, String> {
    let text = read_input(&input)?;
    let program = load_program(&text)?;
    let config = EngineConfig { step_limit };
    let mut engine = Engine::new(chunks_of(&program), Arc::new(DefaultGateway::new()), config);

    match engine.run_to_completion() {
        Ok(ProgramState::Halted) | Ok(ProgramState::StepLimitReached) => {
            print!("{}", render_output(engine.output()));
            io::stdout().flush().map_err(|e| e.to_string())?;
            Ok(ExitCode::from(0))
        }
        Ok(ProgramState::Suspended(_)) => Ok(ExitCode::from(0)),
        Err(e) => {
            print!("{}", render_output(engine.output()));
            eprintln!("vm error: {e}");
            Ok(ExitCode::from(1))
        }
    }
}

fn cmd_debug(input: PathBuf, breakpoints: Vec<usize>, watchpoints: Vec<i64>) -> Result<ExitCode, String> {
    let text = read_input(&Some(input))?;
    let program = load_program(&text)?;

    let mut debugger = StepDebugger::new();
    for pc in breakpoints {
        debugger.set_breakpoint(pc);
    }
    for addr in watchpoints {
        debugger.set_watchpoint(addr, BigInt::from(0));
    }

    let mut engine = Engine::new(chunks_of(&program), Arc::new(DefaultGateway::new()), EngineConfig::default())
        .with_debugger(Box::new(debugger));

    loop {
        match engine.step() {
            Ok(chunkvm::state::ExecuteState::Halted) => break,
            Ok(chunkvm::state::ExecuteState::DebugEvent(event)) => {
                println!("suspended at pc={}: {:?}", engine.pc(), event);
                break;
            }
            Ok(chunkvm::state::ExecuteState::Proceed) => continue,
            Err(e) => {
                eprintln!("vm error: {e}");
                return Ok(ExitCode::from(1));
            }
        }
    }
    print!("{}", render_output(engine.output()));
    Ok(ExitCode::from(0))
}

fn cmd_profile(input: PathBuf, flamegraph: bool) -> Result<ExitCode, String> {
    let text = read_input(&Some(input))?;
    let program = load_program(&text)?;
    let shared = SharedProfiler::new();
    let mut engine = Engine::new(chunks_of(&program), Arc::new(DefaultGateway::new()), EngineConfig::default())
        .with_profiler(Box::new(shared.clone()));

    let result = engine.run_to_completion();
    let profiler = shared.snapshot();

    match result {
        Ok(_) => {
            if flamegraph {
                for line in profiler.to_flamegraph_lines() {
                    println!("{line}");
                }
            } else {
                print!("{profiler}");
            }
            Ok(ExitCode::from(0))
        }
        Err(e) => {
            eprintln!("vm error: {e}");
            Ok(ExitCode::from(1))
        }
    }
}
