//! A1-style cell addresses

use std::fmt;
use std::str::FromStr;

use crate::error::ProcessError;

/// Largest column index (0-based) a worksheet can hold, column `XFD`
pub const MAX_COL: u32 = 16_383;
/// Largest row index (0-based) a worksheet can hold, row 1048576
pub const MAX_ROW: u32 = 1_048_575;

/// Cell reference (e.g., A1, F21), stored as 0-based row and column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse a reference like "F21" into 0-based indices
    pub fn from_a1(a1: &str) -> Option<Self> {
        let split = a1.find(|c: char| !c.is_ascii_alphabetic())?;
        let (letters, digits) = a1.split_at(split);
        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }

        let mut col = 0u32;
        for ch in letters.chars() {
            col = col
                .checked_mul(26)?
                .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
        }
        let row = digits.parse::<u32>().ok()?;
        if row == 0 || col - 1 > MAX_COL || row - 1 > MAX_ROW {
            return None;
        }

        Some(Self::new(row - 1, col - 1))
    }

    pub fn to_a1(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellRef {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::from_a1(s).ok_or_else(|| ProcessError::InvalidCellRef(s.to_string()))
    }
}

/// Convert a 0-based column index to letters (0 -> "A", 26 -> "AA")
pub fn column_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(b'A' + rem);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}
