pub mod error;
pub mod tape;
pub mod op;
pub mod machine;
pub mod parse;
pub mod builder;
pub mod demo;
pub mod soak;

pub use error::{Fault, HaltReason};
pub use machine::{Halt, Machine, MachineConfig, Outcome, OutputPolicy, run, run_with_config};
pub use op::{Op, Program};
pub use tape::Tape;
