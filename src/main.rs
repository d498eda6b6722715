use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tapevm::demo::hello_world;
use tapevm::machine::{Interrupt, StepBudget, StreamSink, Unbounded};
use tapevm::parse::parse;
use tapevm::soak::{SoakConfig, soak};
use tapevm::{
    Halt, HaltReason, Machine, MachineConfig, OutputPolicy, Program, Tape, run_with_config,
};

#[derive(Parser)]
#[command(name = "tapevm", about = "Byte-cell tape machine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one or more program files. Several files run in parallel and
    /// their output is printed in argument order.
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Run the built-in "Hello World!" program.
    Demo {
        #[command(flatten)]
        exec: ExecArgs,
    },

    /// Print a program file in canonical notation (comments stripped).
    Disasm { file: PathBuf },

    /// Run random programs under a step budget and report throughput.
    Soak {
        /// Random seed for reproducibility.
        #[arg(long)]
        seed: u64,

        /// Number of programs to generate.
        #[arg(long, default_value_t = 1 << 12)]
        programs: usize,

        /// Maximum operations per sequence.
        #[arg(long, default_value_t = 32)]
        program_len: usize,

        /// Maximum loop nesting.
        #[arg(long, default_value_t = 4)]
        max_depth: usize,

        /// Max steps per program.
        #[arg(long, default_value_t = 1 << 13)]
        step_limit: u64,

        /// Fault on output bytes above 127.
        #[arg(long)]
        strict_ascii: bool,
    },
}

#[derive(clap::Args)]
struct ExecArgs {
    /// Interrupt after this many steps.
    #[arg(long)]
    step_limit: Option<u64>,

    /// Fault on output bytes above 127 instead of passing them through as Latin-1.
    #[arg(long)]
    strict_ascii: bool,

    /// Print the final tape to stderr.
    #[arg(long)]
    dump_tape: bool,
}

impl ExecArgs {
    fn config(&self) -> MachineConfig {
        MachineConfig {
            output_policy: policy(self.strict_ascii),
            step_limit: self.step_limit,
        }
    }
}

fn policy(strict_ascii: bool) -> OutputPolicy {
    if strict_ascii {
        OutputPolicy::StrictAscii
    } else {
        OutputPolicy::Latin1
    }
}

/// Logs go to stderr; stdout carries program output only.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,tapevm=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let ok = match cli.command {
        Command::Run { files, exec } => {
            if let [file] = files.as_slice() {
                match load(file) {
                    Ok(program) => stream(&program, &exec),
                    Err(e) => {
                        eprintln!("{e}");
                        false
                    }
                }
            } else {
                run_batch(&files, &exec)
            }
        }
        Command::Demo { exec } => stream(&hello_world(), &exec),
        Command::Disasm { file } => match load(&file) {
            Ok(program) => {
                info!(size = program.size(), depth = program.depth(), "parsed");
                println!("{program}");
                true
            }
            Err(e) => {
                eprintln!("{e}");
                false
            }
        },
        Command::Soak {
            seed,
            programs,
            program_len,
            max_depth,
            step_limit,
            strict_ascii,
        } => {
            let config = SoakConfig {
                programs,
                program_len,
                max_depth,
                step_limit,
                output_policy: policy(strict_ascii),
            };
            run_soak(&config, seed);
            true
        }
    };

    if !ok {
        process::exit(1);
    }
}

fn load(path: &Path) -> Result<Program, String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    parse(&source).map_err(|e| format!("{}: {e}", path.display()))
}

/// Run a single program with output written straight to stdout.
fn stream(program: &Program, exec: &ExecArgs) -> bool {
    let mut machine = Machine::new(policy(exec.strict_ascii));
    let mut sink = StreamSink::new(io::stdout().lock());
    let mut interrupt: Box<dyn Interrupt> = match exec.step_limit {
        Some(limit) => Box::new(StepBudget::new(limit)),
        None => Box::new(Unbounded),
    };

    let result = machine.run_with(program.ops(), &mut sink, interrupt.as_mut());
    let steps = machine.steps();
    if exec.dump_tape {
        eprintln!("{}", machine.tape().dump());
    }
    match result {
        Ok(()) => {
            info!(steps, "finished");
            true
        }
        Err(reason) => {
            report_halt(&reason, steps, machine.tape());
            false
        }
    }
}

fn report_halt(reason: &HaltReason, steps: u64, tape: &Tape) {
    eprintln!();
    eprintln!("halted after {steps} steps at cursor {}: {reason}", tape.cursor());
}

/// Run several files in parallel, then print each result in order.
fn run_batch(files: &[PathBuf], exec: &ExecArgs) -> bool {
    let config = exec.config();
    let results: Vec<Result<_, String>> = files
        .par_iter()
        .map(|path| {
            let program = load(path)?;
            Ok(run_with_config(&program, &config))
        })
        .collect();

    let mut ok = true;
    for (path, result) in files.iter().zip(results) {
        println!("==> {} <==", path.display());
        match result {
            Ok(Ok(outcome)) => {
                print!("{}", outcome.output);
                info!(steps = outcome.steps, "{}: finished", path.display());
                if exec.dump_tape {
                    eprintln!("{}", outcome.tape.dump());
                }
            }
            Ok(Err(Halt {
                reason,
                steps,
                tape,
                output,
            })) => {
                print!("{output}");
                report_halt(&reason, steps, &tape);
                if exec.dump_tape {
                    eprintln!("{}", tape.dump());
                }
                ok = false;
            }
            Err(e) => {
                eprintln!("{e}");
                ok = false;
            }
        }
        println!();
    }
    ok
}

fn run_soak(config: &SoakConfig, seed: u64) {
    let start = std::time::Instant::now();
    let report = soak(config, seed);
    let elapsed = start.elapsed();

    let programs_per_sec = report.programs as f64 / elapsed.as_secs_f64();
    let steps_per_sec = report.steps as f64 / elapsed.as_secs_f64();

    eprintln!("Soak results:");
    eprintln!("  Programs:          {}", report.programs);
    eprintln!("  Finished:          {}", report.finished);
    eprintln!("  Interrupted:       {}", report.interrupted);
    eprintln!("  Out of range:      {}", report.out_of_range);
    eprintln!("  Non-ASCII output:  {}", report.non_ascii);
    eprintln!("  Total steps:       {}", report.steps);
    eprintln!("  Output chars:      {}", report.output_chars);
    eprintln!("  Elapsed:           {elapsed:.2?}");
    eprintln!("  Programs/sec:      {programs_per_sec:.1}");
    eprintln!("  Steps/sec:         {steps_per_sec:.0}");
}
