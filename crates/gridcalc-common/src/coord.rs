use std::fmt;

pub const MAX_ROW: u32 = 1_048_576;
pub const MAX_COL: u32 = 16_384;

/// Absolute 1-based grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    pub row: u32,
    pub col: u32,
}

impl Address {
    pub fn new(row: u32, col: u32) -> Self {
        Address { row, col }
    }

    pub fn in_bounds(&self) -> bool {
        self.row >= 1 && self.row <= MAX_ROW && self.col >= 1 && self.col <= MAX_COL
    }

    /// A1-style rendering, e.g. `C7`.
    pub fn to_a1(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// A formula-side coordinate: a 1-based position plus per-axis anchoring.
/// A relative axis stores the position as written at the formula's base cell
/// and shifts by the base→target delta when the formula is replayed
/// elsewhere; an absolute axis never moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefCoord {
    pub row: u32,
    pub col: u32,
    pub row_abs: bool,
    pub col_abs: bool,
}

impl RefCoord {
    pub fn new(row: u32, col: u32, row_abs: bool, col_abs: bool) -> Self {
        RefCoord { row, col, row_abs, col_abs }
    }

    pub fn absolute(row: u32, col: u32) -> Self {
        RefCoord { row, col, row_abs: true, col_abs: true }
    }

    /// Replay this coordinate from `base` at `target`. Relative axes shift by
    /// the signed delta; absolute axes stay put. `None` when the shifted
    /// position falls off the grid.
    pub fn rebase(&self, base: Address, target: Address) -> Option<Address> {
        let row = if self.row_abs {
            i64::from(self.row)
        } else {
            i64::from(self.row) + i64::from(target.row) - i64::from(base.row)
        };
        let col = if self.col_abs {
            i64::from(self.col)
        } else {
            i64::from(self.col) + i64::from(target.col) - i64::from(base.col)
        };
        if row < 1 || row > i64::from(MAX_ROW) || col < 1 || col > i64::from(MAX_COL) {
            return None;
        }
        Some(Address::new(row as u32, col as u32))
    }

    /// Render with `$` anchors, e.g. `$B7`.
    pub fn to_a1(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_abs { "$" } else { "" },
            column_to_letters(self.col),
            if self.row_abs { "$" } else { "" },
            self.row
        )
    }
}

impl fmt::Display for RefCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// An ordered rectangular range. Construction enforces start ≤ end on both
/// axes; inverted input is rejected rather than silently swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeAddr {
    pub start: Address,
    pub end: Address,
}

impl RangeAddr {
    pub fn new(start: Address, end: Address) -> Option<Self> {
        if start.row > end.row || start.col > end.col {
            return None;
        }
        Some(RangeAddr { start, end })
    }

    pub fn single(addr: Address) -> Self {
        RangeAddr { start: addr, end: addr }
    }

    pub fn rows(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.row >= self.start.row
            && addr.row <= self.end.row
            && addr.col >= self.start.col
            && addr.col <= self.end.col
    }

    pub fn iter(&self) -> impl Iterator<Item = Address> + '_ {
        let (sr, er, sc, ec) = (self.start.row, self.end.row, self.start.col, self.end.col);
        (sr..=er).flat_map(move |r| (sc..=ec).map(move |c| Address::new(r, c)))
    }
}

impl fmt::Display for RangeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// 1-based column index to letters: 1 → `A`, 27 → `AA`.
pub fn column_to_letters(col: u32) -> String {
    let mut col = col;
    let mut out = Vec::new();
    while col > 0 {
        let rem = ((col - 1) % 26) as u8;
        out.push(b'A' + rem);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Letters to 1-based column index; `None` on empty or non-alphabetic input
/// or overflow past the grid width.
pub fn letters_to_column(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for b in s.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        let d = u32::from(b.to_ascii_uppercase() - b'A') + 1;
        col = col.checked_mul(26)?.checked_add(d)?;
    }
    if col > MAX_COL { None } else { Some(col) }
}
