use std::fmt::{self, Write};
use std::mem;

/// One machine operation.
///
/// Programs are trees: `Loop` nodes hold an ordered body, every other kind is
/// a leaf. There is no sequence node; sequencing is the order of a `Vec<Op>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Move the cursor this many cells towards positive indices.
    MoveRight(u64),
    /// Move the cursor this many cells towards negative indices.
    MoveLeft(u64),
    /// Add to the current cell, wrapping mod 256.
    Increment(u8),
    /// Subtract from the current cell, wrapping mod 256.
    Decrement(u8),
    /// Emit the current cell as one character.
    Output,
    /// Run the body while the current cell is non-zero.
    Loop(Vec<Op>),
    /// Identity step.
    NoOp,
}

impl Op {
    pub fn right() -> Self {
        Op::MoveRight(1)
    }

    pub fn left() -> Self {
        Op::MoveLeft(1)
    }

    pub fn inc() -> Self {
        Op::Increment(1)
    }

    pub fn dec() -> Self {
        Op::Decrement(1)
    }

    /// Number of nodes in this subtree, counting the loop node itself.
    pub fn size(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(op) = pending.pop() {
            count += 1;
            if let Op::Loop(body) = op {
                pending.extend(body);
            }
        }
        count
    }

    /// Loop nesting depth of this subtree (0 for leaves).
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(self, 0)];
        while let Some((op, level)) = pending.pop() {
            if let Op::Loop(body) = op {
                deepest = deepest.max(level + 1);
                pending.extend(body.iter().map(|child| (child, level + 1)));
            }
        }
        deepest
    }
}

fn repeat(f: &mut fmt::Formatter<'_>, ch: char, count: u64) -> fmt::Result {
    for _ in 0..count {
        f.write_char(ch)?;
    }
    Ok(())
}

/// Write `ops` in classic notation. Counts are spelled out as repeated symbols
/// and `NoOp` renders as nothing. Walks the tree with an explicit stack.
fn write_ops(f: &mut fmt::Formatter<'_>, ops: &[Op]) -> fmt::Result {
    enum Item<'a> {
        Op(&'a Op),
        Close,
    }

    let mut pending: Vec<Item<'_>> = ops.iter().rev().map(Item::Op).collect();
    while let Some(item) = pending.pop() {
        match item {
            Item::Close => f.write_char(']')?,
            Item::Op(Op::Loop(body)) => {
                f.write_char('[')?;
                pending.push(Item::Close);
                pending.extend(body.iter().rev().map(Item::Op));
            }
            Item::Op(Op::MoveRight(n)) => repeat(f, '>', *n)?,
            Item::Op(Op::MoveLeft(n)) => repeat(f, '<', *n)?,
            Item::Op(Op::Increment(n)) => repeat(f, '+', u64::from(*n))?,
            Item::Op(Op::Decrement(n)) => repeat(f, '-', u64::from(*n))?,
            Item::Op(Op::Output) => f.write_char('.')?,
            Item::Op(Op::NoOp) => {}
        }
    }
    Ok(())
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ops(f, std::slice::from_ref(self))
    }
}

/// Loop bodies are torn down through an explicit stack so that dropping a
/// deeply nested tree does not recurse once per level.
impl Drop for Op {
    fn drop(&mut self) {
        let Op::Loop(body) = self else {
            return;
        };
        if !body.iter().any(|op| matches!(op, Op::Loop(_))) {
            return;
        }
        let mut pending = mem::take(body);
        while let Some(mut op) = pending.pop() {
            if let Op::Loop(inner) = &mut op {
                pending.append(inner);
            }
        }
    }
}

/// A complete program: the root sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Program {
    ops: Vec<Op>,
}

impl Program {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Total node count of the tree.
    pub fn size(&self) -> usize {
        self.ops.iter().map(Op::size).sum()
    }

    /// Deepest loop nesting.
    pub fn depth(&self) -> usize {
        self.ops.iter().map(Op::depth).max().unwrap_or(0)
    }
}

impl From<Vec<Op>> for Program {
    fn from(ops: Vec<Op>) -> Self {
        Self::new(ops)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ops(f, &self.ops)
    }
}
