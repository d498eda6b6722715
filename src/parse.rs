//! Front end for the classic notation: `>` `<` `+` `-` `.` `[` `]`.
//!
//! Every other character is a comment, except `,` (input), which has no
//! counterpart in the operation set and is rejected. Runs of the same symbol
//! fold into a single counted operation; cell runs longer than 255 are split
//! so that `Display` of the result spells the same run back.

use std::mem;
use std::str::FromStr;

use thiserror::Error;

use crate::op::{Op, Program};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unmatched '[' at byte {0}")]
    UnmatchedOpen(usize),

    #[error("unmatched ']' at byte {0}")]
    UnmatchedClose(usize),

    #[error("input instruction ',' at byte {0} is not supported")]
    UnsupportedInput(usize),
}

impl ParseError {
    /// Byte offset of the offending character.
    pub fn offset(&self) -> usize {
        match *self {
            ParseError::UnmatchedOpen(pos)
            | ParseError::UnmatchedClose(pos)
            | ParseError::UnsupportedInput(pos) => pos,
        }
    }
}

pub fn parse(source: &str) -> Result<Program, ParseError> {
    // Enclosing sequences of the loop currently being read, with the offset
    // of the '[' that opened each one.
    let mut open: Vec<(usize, Vec<Op>)> = Vec::new();
    let mut current = Vec::new();

    for (pos, byte) in source.bytes().enumerate() {
        match byte {
            b'>' => extend_move(&mut current, true),
            b'<' => extend_move(&mut current, false),
            b'+' => extend_cell(&mut current, true),
            b'-' => extend_cell(&mut current, false),
            b'.' => current.push(Op::Output),
            b'[' => open.push((pos, mem::take(&mut current))),
            b']' => {
                let (_, parent) = open.pop().ok_or(ParseError::UnmatchedClose(pos))?;
                let body = mem::replace(&mut current, parent);
                current.push(Op::Loop(body));
            }
            b',' => return Err(ParseError::UnsupportedInput(pos)),
            _ => {}
        }
    }

    match open.first() {
        Some(&(pos, _)) => Err(ParseError::UnmatchedOpen(pos)),
        None => Ok(Program::new(current)),
    }
}

fn extend_move(ops: &mut Vec<Op>, right: bool) {
    let merged = match (ops.last_mut(), right) {
        (Some(Op::MoveRight(n)), true) | (Some(Op::MoveLeft(n)), false) => {
            *n += 1;
            true
        }
        _ => false,
    };
    if !merged {
        ops.push(if right { Op::right() } else { Op::left() });
    }
}

fn extend_cell(ops: &mut Vec<Op>, up: bool) {
    let merged = match (ops.last_mut(), up) {
        (Some(Op::Increment(n)), true) | (Some(Op::Decrement(n)), false) if *n < u8::MAX => {
            *n += 1;
            true
        }
        _ => false,
    };
    if !merged {
        ops.push(if up { Op::inc() } else { Op::dec() });
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
