use std::collections::BTreeMap;

use crate::error::Fault;

/// The machine's memory: a sparse, bidirectionally infinite row of byte cells
/// and a cursor into it.
///
/// Cells that were never visited are logically zero. Visiting a cell (moving
/// onto it, reading or writing it) materializes it, so `cells()` lists every
/// index the cursor has stood on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape {
    cells: BTreeMap<i64, u8>,
    cursor: i64,
}

impl Default for Tape {
    fn default() -> Self {
        Self::new()
    }
}

impl Tape {
    /// Fresh tape: cursor at 0, only index 0 materialized.
    pub fn new() -> Self {
        let mut cells = BTreeMap::new();
        cells.insert(0, 0);
        Self { cells, cursor: 0 }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Value under the cursor.
    #[inline]
    pub fn read(&mut self) -> u8 {
        *self.cells.entry(self.cursor).or_insert(0)
    }

    #[inline]
    pub fn write(&mut self, value: u8) {
        self.cells.insert(self.cursor, value);
    }

    /// Apply `f` to the cell under the cursor.
    #[inline]
    pub fn update(&mut self, f: impl FnOnce(u8) -> u8) {
        let cell = self.cells.entry(self.cursor).or_insert(0);
        *cell = f(*cell);
    }

    pub fn move_to(&mut self, index: i64) {
        self.cursor = index;
        self.cells.entry(index).or_insert(0);
    }

    /// Move the cursor by `delta` cells. Fails instead of wrapping when the
    /// destination is outside the i64 range; the cursor is left untouched.
    pub fn shift(&mut self, delta: i128) -> Result<(), Fault> {
        let target = i128::from(self.cursor) + delta;
        let index = i64::try_from(target).map_err(|_| Fault::OutOfRange {
            cursor: self.cursor,
            delta,
        })?;
        self.move_to(index);
        Ok(())
    }

    /// Value at `index` without materializing it. `None` means never visited.
    pub fn get(&self, index: i64) -> Option<u8> {
        self.cells.get(&index).copied()
    }

    /// Value at `index`, treating unvisited cells as zero.
    pub fn peek(&self, index: i64) -> u8 {
        self.get(index).unwrap_or(0)
    }

    /// Materialized cells in ascending index order.
    pub fn cells(&self) -> impl Iterator<Item = (i64, u8)> + '_ {
        self.cells.iter().map(|(&i, &v)| (i, v))
    }

    /// Number of materialized cells.
    pub fn visited(&self) -> usize {
        self.cells.len()
    }

    /// Render the inclusive index range `from..=to` as a hex dump line, with
    /// the cursor cell bracketed.
    pub fn window(&self, from: i64, to: i64) -> String {
        let mut out = String::new();
        for index in from..=to {
            if !out.is_empty() {
                out.push(' ');
            }
            let value = self.peek(index);
            if index == self.cursor {
                out.push_str(&format!("[{value:02x}]"));
            } else {
                out.push_str(&format!("{value:02x}"));
            }
        }
        out
    }

    /// Hex dump of the materialized span (plus the cursor).
    pub fn dump(&self) -> String {
        let lo = self.cells.keys().next().copied().unwrap_or(0).min(self.cursor);
        let hi = self.cells.keys().next_back().copied().unwrap_or(0).max(self.cursor);
        format!("{lo}..={hi}: {}", self.window(lo, hi))
    }
}
