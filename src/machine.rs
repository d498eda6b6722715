use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use crate::error::{Fault, HaltReason};
use crate::op::{Op, Program};
use crate::tape::Tape;

/// What to do with cell values that are not 7-bit ASCII at output time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Pass the byte through as the Latin-1 character of the same value.
    #[default]
    Latin1,
    /// Fault with `NonAsciiOutput` on values 128-255.
    StrictAscii,
}

impl OutputPolicy {
    pub fn encode(self, value: u8) -> Result<char, Fault> {
        match self {
            OutputPolicy::Latin1 => Ok(char::from(value)),
            OutputPolicy::StrictAscii if value.is_ascii() => Ok(char::from(value)),
            OutputPolicy::StrictAscii => Err(Fault::NonAsciiOutput { value }),
        }
    }
}

/// Receives one character per executed `Output`, in program order.
pub trait OutputSink {
    fn emit(&mut self, ch: char) -> io::Result<()>;
}

impl OutputSink for String {
    fn emit(&mut self, ch: char) -> io::Result<()> {
        self.push(ch);
        Ok(())
    }
}

impl<S: OutputSink + ?Sized> OutputSink for &mut S {
    fn emit(&mut self, ch: char) -> io::Result<()> {
        (**self).emit(ch)
    }
}

/// Writes each character UTF-8 encoded and flushes immediately.
pub struct StreamSink<W: io::Write> {
    inner: W,
}

impl<W: io::Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> OutputSink for StreamSink<W> {
    fn emit(&mut self, ch: char) -> io::Result<()> {
        let mut buf = [0u8; 4];
        self.inner.write_all(ch.encode_utf8(&mut buf).as_bytes())?;
        self.inner.flush()
    }
}

/// Per-step hook consulted before every step. Returning `true` stops the run
/// with `HaltReason::Interrupted`.
///
/// `steps` is the number of steps completed so far.
pub trait Interrupt {
    fn should_stop(&mut self, steps: u64) -> bool;
}

impl<F: FnMut(u64) -> bool> Interrupt for F {
    fn should_stop(&mut self, steps: u64) -> bool {
        self(steps)
    }
}

/// Never interrupts.
pub struct Unbounded;

impl Interrupt for Unbounded {
    #[inline(always)]
    fn should_stop(&mut self, _steps: u64) -> bool {
        false
    }
}

/// Allows at most `limit` steps.
#[derive(Debug, Clone, Copy)]
pub struct StepBudget {
    pub limit: u64,
}

impl StepBudget {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl Interrupt for StepBudget {
    #[inline(always)]
    fn should_stop(&mut self, steps: u64) -> bool {
        steps >= self.limit
    }
}

/// Stops once a wall-clock instant has passed. The clock is sampled every
/// `Deadline::CHECK_EVERY` steps.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    const CHECK_EVERY: u64 = 1024;

    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }
}

impl Interrupt for Deadline {
    fn should_stop(&mut self, steps: u64) -> bool {
        steps % Self::CHECK_EVERY == 0 && Instant::now() >= self.at
    }
}

/// Configuration for a single run.
#[derive(Debug, Clone, Default)]
pub struct MachineConfig {
    pub output_policy: OutputPolicy,
    /// Maximum steps before the run is interrupted (`None` for no limit).
    pub step_limit: Option<u64>,
}

/// A program that ran to completion.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub tape: Tape,
    pub output: String,
    pub steps: u64,
}

/// A run that stopped early. Everything observable up to the halt is kept.
#[derive(Debug, Error)]
#[error("halted after {steps} steps: {reason}")]
pub struct Halt {
    #[source]
    pub reason: HaltReason,
    /// Steps completed before the halting one.
    pub steps: u64,
    pub tape: Tape,
    pub output: String,
}

/// Position within one sequence of the program tree.
struct Frame<'p> {
    body: &'p [Op],
    pc: usize,
    /// Loop bodies re-test the current cell when they reach their end; the
    /// root sequence just finishes.
    looping: bool,
}

/// The machine state: a tape plus the number of completed steps.
///
/// A step is one operation applied (`NoOp` included) or one loop test, either
/// on entry or after the body finishes.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    tape: Tape,
    policy: OutputPolicy,
    steps: u64,
}

impl Machine {
    pub fn new(policy: OutputPolicy) -> Self {
        Self {
            tape: Tape::new(),
            policy,
            steps: 0,
        }
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn into_tape(self) -> Tape {
        self.tape
    }

    /// Evaluate `program` against this machine's tape.
    ///
    /// Loops are driven by an explicit frame stack, so neither iteration count
    /// nor nesting depth grows the call stack. `interrupt` is consulted before
    /// each step.
    pub fn run_with<S, I>(
        &mut self,
        program: &[Op],
        sink: &mut S,
        interrupt: &mut I,
    ) -> Result<(), HaltReason>
    where
        S: OutputSink + ?Sized,
        I: Interrupt + ?Sized,
    {
        let mut frames = vec![Frame {
            body: program,
            pc: 0,
            looping: false,
        }];

        while let Some(frame) = frames.last_mut() {
            let body = frame.body;
            let Some(op) = body.get(frame.pc) else {
                if frame.looping {
                    self.check(interrupt)?;
                    let repeat = self.tape.read() != 0;
                    self.steps += 1;
                    if repeat {
                        frame.pc = 0;
                        continue;
                    }
                    trace!(cursor = self.tape.cursor(), depth = frames.len() - 1, "loop exit");
                }
                frames.pop();
                continue;
            };
            frame.pc += 1;

            self.check(interrupt)?;
            match op {
                Op::MoveRight(n) => self.tape.shift(i128::from(*n))?,
                Op::MoveLeft(n) => self.tape.shift(-i128::from(*n))?,
                Op::Increment(n) => self.tape.update(|v| v.wrapping_add(*n)),
                Op::Decrement(n) => self.tape.update(|v| v.wrapping_sub(*n)),
                Op::Output => {
                    let ch = self.policy.encode(self.tape.read())?;
                    sink.emit(ch)?;
                }
                Op::NoOp => {}
                Op::Loop(inner) => {
                    if self.tape.read() != 0 {
                        trace!(cursor = self.tape.cursor(), depth = frames.len(), "loop enter");
                        frames.push(Frame {
                            body: inner,
                            pc: 0,
                            looping: true,
                        });
                    }
                }
            }
            self.steps += 1;
        }
        Ok(())
    }

    #[inline(always)]
    fn check<I: Interrupt + ?Sized>(&self, interrupt: &mut I) -> Result<(), HaltReason> {
        if interrupt.should_stop(self.steps) {
            return Err(HaltReason::Interrupted);
        }
        Ok(())
    }
}

/// Run `program` on a fresh tape with the default configuration, collecting
/// output into a string.
pub fn run(program: &Program) -> Result<Outcome, Halt> {
    run_with_config(program, &MachineConfig::default())
}

pub fn run_with_config(program: &Program, config: &MachineConfig) -> Result<Outcome, Halt> {
    let mut machine = Machine::new(config.output_policy);
    let mut output = String::new();
    debug!(
        size = program.size(),
        depth = program.depth(),
        step_limit = ?config.step_limit,
        "run start"
    );

    let result = match config.step_limit {
        Some(limit) => machine.run_with(program.ops(), &mut output, &mut StepBudget::new(limit)),
        None => machine.run_with(program.ops(), &mut output, &mut Unbounded),
    };

    let steps = machine.steps();
    match result {
        Ok(()) => {
            debug!(steps, output_len = output.len(), "run finished");
            Ok(Outcome {
                tape: machine.into_tape(),
                output,
                steps,
            })
        }
        Err(reason) => {
            debug!(steps, %reason, "run halted");
            Err(Halt {
                reason,
                steps,
                tape: machine.into_tape(),
                output,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn run_ops(ops: Vec<Op>) -> Outcome {
        run(&Program::new(ops)).unwrap()
    }

    #[test]
    fn test_empty_program() {
        let outcome = run_ops(vec![]);
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.output, "");
        assert_eq!(outcome.tape, Tape::new());
    }

    #[test]
    fn test_increment_wraps() {
        let outcome = run_ops(vec![Op::Increment(255), Op::Increment(2)]);
        assert_eq!(outcome.tape.peek(0), 1);
    }

    #[test]
    fn test_decrement_wraps() {
        let outcome = run_ops(vec![Op::dec()]);
        assert_eq!(outcome.tape.peek(0), 255);
    }

    #[test]
    fn test_moves() {
        let outcome = run_ops(vec![Op::MoveRight(3), Op::inc(), Op::MoveLeft(5), Op::dec()]);
        assert_eq!(outcome.tape.cursor(), -2);
        assert_eq!(outcome.tape.peek(3), 1);
        assert_eq!(outcome.tape.peek(-2), 255);
        // Only the cells actually stood on are materialized.
        assert_eq!(outcome.tape.visited(), 3);
    }

    #[test]
    fn test_noop_counts_as_step() {
        let outcome = run_ops(vec![Op::NoOp, Op::NoOp]);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.tape, Tape::new());
    }

    #[test]
    fn test_output_latin1_passthrough() {
        let outcome = run_ops(vec![Op::Increment(0xE9), Op::Output]);
        assert_eq!(outcome.output, "é");
    }

    #[test]
    fn test_output_strict_ascii_faults() {
        let config = MachineConfig {
            output_policy: OutputPolicy::StrictAscii,
            ..Default::default()
        };
        let program = Program::new(vec![
            Op::Increment(b'A'),
            Op::Output,
            Op::Increment(128),
            Op::Output,
        ]);
        let halt = run_with_config(&program, &config).unwrap_err();
        assert_eq!(halt.reason.fault(), Some(&Fault::NonAsciiOutput { value: 193 }));
        assert_eq!(halt.output, "A");
        assert_eq!(halt.steps, 3);
    }

    #[test]
    fn test_simple_loop_moves_value() {
        // +++[>+<-]
        let outcome = run_ops(vec![
            Op::Increment(3),
            Op::Loop(vec![Op::right(), Op::inc(), Op::left(), Op::dec()]),
        ]);
        assert_eq!(outcome.tape.peek(0), 0);
        assert_eq!(outcome.tape.peek(1), 3);
        // 1 increment + 1 entry test + 3 * (4 body ops + 1 re-test)
        assert_eq!(outcome.steps, 17);
    }

    #[test]
    fn test_loop_zero_skip() {
        let outcome = run_ops(vec![Op::Loop(vec![Op::right(), Op::inc(), Op::Output])]);
        assert_eq!(outcome.tape, Tape::new());
        assert_eq!(outcome.output, "");
        assert_eq!(outcome.steps, 1);
    }

    #[test]
    fn test_nested_loops() {
        // ++[>+++[>+<-]<-]  leaves 6 in cell 2
        let outcome = run_ops(vec![
            Op::Increment(2),
            Op::Loop(vec![
                Op::right(),
                Op::Increment(3),
                Op::Loop(vec![Op::right(), Op::inc(), Op::left(), Op::dec()]),
                Op::left(),
                Op::dec(),
            ]),
        ]);
        assert_eq!(outcome.tape.peek(0), 0);
        assert_eq!(outcome.tape.peek(1), 0);
        assert_eq!(outcome.tape.peek(2), 6);
        assert_eq!(outcome.tape.cursor(), 0);
    }

    #[test]
    fn test_empty_loop_body_on_nonzero_runs_forever() {
        let program = Program::new(vec![Op::inc(), Op::Loop(vec![Op::NoOp])]);
        let config = MachineConfig {
            step_limit: Some(10_000),
            ..Default::default()
        };
        let halt = run_with_config(&program, &config).unwrap_err();
        assert!(halt.reason.is_interrupted());
        assert_eq!(halt.steps, 10_000);
        assert_eq!(halt.tape.peek(0), 1);
    }

    #[test]
    fn test_move_out_of_range_preserves_output() {
        let program = Program::new(vec![
            Op::Increment(b'x'),
            Op::Output,
            Op::MoveRight(u64::MAX),
            Op::Output,
        ]);
        // u64::MAX does not fit from cursor 0.
        let halt = run(&program).unwrap_err();
        assert_eq!(
            halt.reason.fault(),
            Some(&Fault::OutOfRange {
                cursor: 0,
                delta: i128::from(u64::MAX)
            })
        );
        assert_eq!(halt.output, "x");
        assert_eq!(halt.steps, 2);
        assert_eq!(halt.tape.cursor(), 0);
    }

    #[test]
    fn test_move_to_exact_limits() {
        let max = i64::MAX as u64;
        let outcome = run_ops(vec![
            Op::MoveRight(max),
            Op::MoveLeft(max),
            Op::MoveLeft(max),
            Op::left(),
        ]);
        assert_eq!(outcome.tape.cursor(), i64::MIN);

        let halt = run(&Program::new(vec![Op::MoveLeft(max + 1), Op::left()])).unwrap_err();
        assert!(matches!(
            halt.reason.fault(),
            Some(Fault::OutOfRange { cursor, .. }) if *cursor == i64::MIN
        ));
    }

    #[test]
    fn test_runaway_right_loop_is_interrupted() {
        // +[>+]  walks right forever
        let program = Program::new(vec![Op::inc(), Op::Loop(vec![Op::right(), Op::inc()])]);
        let config = MachineConfig {
            step_limit: Some(301),
            ..Default::default()
        };
        let halt = run_with_config(&program, &config).unwrap_err();
        assert!(halt.reason.is_interrupted());
        // 1 + 1 entry + 100 * (2 body + 1 re-test) = 302 > 301, so the last
        // re-test is not reached.
        assert_eq!(halt.tape.cursor(), 100);
    }

    #[test]
    fn test_deep_nesting_runs_displays_and_drops() {
        let depth = 200_000;
        let source = format!("+{}-{}", "[".repeat(depth), "]".repeat(depth));
        let program = parse(&source).unwrap();
        assert_eq!(program.depth(), depth);

        let outcome = run(&program).unwrap();
        assert_eq!(outcome.tape.peek(0), 0);
        // 1 increment + one entry test and one exit test per level + 1 decrement
        assert_eq!(outcome.steps, 2 * depth as u64 + 2);

        assert!(program.to_string() == source);
        drop(program);
    }

    #[test]
    fn test_closure_interrupt() {
        let program = Program::new(vec![Op::inc(), Op::Loop(vec![])]);
        let mut machine = Machine::default();
        let mut output = String::new();
        let mut seen = 0u64;
        let result = machine.run_with(program.ops(), &mut output, &mut |steps: u64| {
            seen = steps;
            steps == 50
        });
        assert!(matches!(result, Err(HaltReason::Interrupted)));
        assert_eq!(seen, 50);
        assert_eq!(machine.steps(), 50);
    }

    #[test]
    fn test_deadline_in_past_interrupts_at_start() {
        let program = Program::new(vec![Op::inc(), Op::Loop(vec![])]);
        let mut machine = Machine::default();
        let mut output = String::new();
        let mut deadline = Deadline::at(Instant::now());
        let result = machine.run_with(program.ops(), &mut output, &mut deadline);
        assert!(matches!(result, Err(HaltReason::Interrupted)));
        assert_eq!(machine.steps(), 0);
    }

    #[test]
    fn test_deadline_in_future_lets_program_finish() {
        let program = Program::new(vec![
            Op::Increment(5),
            Op::Loop(vec![Op::dec(), Op::Output]),
        ]);
        let mut machine = Machine::default();
        let mut output = String::new();
        let mut deadline = Deadline::after(Duration::from_secs(60));
        machine.run_with(program.ops(), &mut output, &mut deadline).unwrap();
        assert_eq!(output.chars().count(), 5);
        assert_eq!(machine.tape().peek(0), 0);
    }

    #[test]
    fn test_stream_sink_writes_utf8() {
        let program = Program::new(vec![
            Op::Increment(b'h'),
            Op::Output,
            Op::Increment(0xFF - b'h'),
            Op::Output,
        ]);
        let mut machine = Machine::default();
        let mut sink = StreamSink::new(Vec::new());
        machine.run_with(program.ops(), &mut sink, &mut Unbounded).unwrap();
        assert_eq!(String::from_utf8(sink.into_inner()).unwrap(), "hÿ");
    }

    struct BrokenSink;

    impl OutputSink for BrokenSink {
        fn emit(&mut self, _ch: char) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn test_sink_failure_halts() {
        let program = Program::new(vec![Op::inc(), Op::Output, Op::inc()]);
        let mut machine = Machine::default();
        let result = machine.run_with(program.ops(), &mut BrokenSink, &mut Unbounded);
        assert!(matches!(result, Err(HaltReason::Sink(_))));
        assert_eq!(machine.steps(), 1);
        assert_eq!(machine.tape().peek(0), 1);
    }
}
