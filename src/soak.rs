use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Fault, HaltReason};
use crate::machine::{MachineConfig, OutputPolicy, run_with_config};
use crate::op::{Op, Program};

/// Configuration for a random-program soak.
#[derive(Debug, Clone)]
pub struct SoakConfig {
    /// Number of programs to generate and run.
    pub programs: usize,
    /// Operations per sequence (root and each loop body draw up to this many).
    pub program_len: usize,
    /// Maximum loop nesting.
    pub max_depth: usize,
    /// Steps per program before it is interrupted.
    pub step_limit: u64,
    pub output_policy: OutputPolicy,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            programs: 1 << 12, // 4096
            program_len: 32,
            max_depth: 4,
            step_limit: 1 << 13, // 8192
            output_policy: OutputPolicy::Latin1,
        }
    }
}

/// Aggregate outcome of a soak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoakReport {
    pub programs: usize,
    pub finished: usize,
    pub interrupted: usize,
    pub out_of_range: usize,
    pub non_ascii: usize,
    pub steps: u64,
    pub output_chars: u64,
}

impl SoakReport {
    fn merge(self, other: Self) -> Self {
        Self {
            programs: self.programs + other.programs,
            finished: self.finished + other.finished,
            interrupted: self.interrupted + other.interrupted,
            out_of_range: self.out_of_range + other.out_of_range,
            non_ascii: self.non_ascii + other.non_ascii,
            steps: self.steps + other.steps,
            output_chars: self.output_chars + other.output_chars,
        }
    }

    /// Sink failures cannot happen with the in-memory sink used here.
    fn record(program_steps: u64, output: &str, reason: Option<&HaltReason>) -> Self {
        let mut report = Self {
            programs: 1,
            steps: program_steps,
            output_chars: output.chars().count() as u64,
            ..Default::default()
        };
        match reason {
            None => report.finished = 1,
            Some(HaltReason::Interrupted) => report.interrupted = 1,
            Some(HaltReason::Fault(Fault::OutOfRange { .. })) => report.out_of_range = 1,
            Some(HaltReason::Fault(Fault::NonAsciiOutput { .. })) => report.non_ascii = 1,
            Some(HaltReason::Sink(_)) => {}
        }
        report
    }
}

/// Generate a random operation tree.
///
/// Leaves are drawn uniformly from the six non-loop kinds; a loop is chosen
/// with probability 1/8 while `max_depth` allows it.
pub fn random_program(rng: &mut SmallRng, len: usize, max_depth: usize) -> Program {
    Program::new(random_sequence(rng, len, max_depth))
}

fn random_sequence(rng: &mut SmallRng, len: usize, depth_left: usize) -> Vec<Op> {
    let count = rng.gen_range(0..=len);
    (0..count)
        .map(|_| {
            if depth_left > 0 && rng.gen_range(0..8) == 0 {
                return Op::Loop(random_sequence(rng, len / 2, depth_left - 1));
            }
            match rng.gen_range(0..6) {
                0 => Op::MoveRight(rng.gen_range(1..=4)),
                1 => Op::MoveLeft(rng.gen_range(1..=4)),
                2 => Op::Increment(rng.r#gen()),
                3 => Op::Decrement(rng.r#gen()),
                4 => Op::Output,
                _ => Op::NoOp,
            }
        })
        .collect()
}

/// Per-program seed. Spreads consecutive indices across the seed space.
fn program_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Generate and run `config.programs` random programs in parallel.
///
/// Each program gets its own RNG derived from `seed` and its index, so the
/// report is the same for a given seed regardless of thread count.
pub fn soak(config: &SoakConfig, seed: u64) -> SoakReport {
    let machine_config = MachineConfig {
        output_policy: config.output_policy,
        step_limit: Some(config.step_limit),
    };

    let report = (0..config.programs)
        .into_par_iter()
        .map(|index| {
            let mut rng = SmallRng::seed_from_u64(program_seed(seed, index));
            let program = random_program(&mut rng, config.program_len, config.max_depth);
            match run_with_config(&program, &machine_config) {
                Ok(outcome) => SoakReport::record(outcome.steps, &outcome.output, None),
                Err(halt) => SoakReport::record(halt.steps, &halt.output, Some(&halt.reason)),
            }
        })
        .reduce(SoakReport::default, SoakReport::merge);

    debug!(?report, seed, "soak complete");
    report
}
