//! Execution errors

use std::io;

use thiserror::Error;

/// A fatal machine fault. Execution stops at the faulting step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// Cursor arithmetic left the representable index range.
    #[error("cursor out of range: {cursor} {delta:+} does not fit in an i64 index")]
    OutOfRange { cursor: i64, delta: i128 },

    /// A byte above 127 was output under the strict ASCII policy.
    #[error("cell value {value} is not a 7-bit ASCII character")]
    NonAsciiOutput { value: u8 },
}

/// Why a run stopped before the program completed.
#[derive(Debug, Error)]
pub enum HaltReason {
    #[error(transparent)]
    Fault(#[from] Fault),

    /// The caller's interrupt fired (step budget, deadline, ...).
    #[error("interrupted")]
    Interrupted,

    #[error("output sink failed: {0}")]
    Sink(#[from] io::Error),
}

impl HaltReason {
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            HaltReason::Fault(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, HaltReason::Interrupted)
    }
}
