use crate::op::{Op, Program};

/// Fluent construction of operation trees.
///
/// `group` exists only for authoring: its contents are inlined into the
/// enclosing sequence, so the built program contains no trace of it.
#[derive(Debug, Clone, Default)]
pub struct ProgramBuilder {
    ops: Vec<Op>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn ops(mut self, ops: impl IntoIterator<Item = Op>) -> Self {
        self.ops.extend(ops);
        self
    }

    pub fn right(self, n: u64) -> Self {
        self.op(Op::MoveRight(n))
    }

    pub fn left(self, n: u64) -> Self {
        self.op(Op::MoveLeft(n))
    }

    pub fn inc(self, n: u8) -> Self {
        self.op(Op::Increment(n))
    }

    pub fn dec(self, n: u8) -> Self {
        self.op(Op::Decrement(n))
    }

    pub fn output(self) -> Self {
        self.op(Op::Output)
    }

    pub fn noop(self) -> Self {
        self.op(Op::NoOp)
    }

    /// Append a loop whose body is built by `body`.
    pub fn while_nonzero(self, body: impl FnOnce(ProgramBuilder) -> ProgramBuilder) -> Self {
        let inner = body(ProgramBuilder::new()).ops;
        self.op(Op::Loop(inner))
    }

    /// Append the operations built by `body` directly to this sequence.
    pub fn group(self, body: impl FnOnce(ProgramBuilder) -> ProgramBuilder) -> Self {
        let inner = body(ProgramBuilder::new()).ops;
        self.ops(inner)
    }

    pub fn build(self) -> Program {
        Program::new(self.ops)
    }
}
