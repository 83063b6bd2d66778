//! The fixed form set and the cross-sheet rewrite table
//!
//! Both tables are plain data: the rewriter executes them without any knowledge of
//! which forms exist or which cells they link.

use regex::Regex;
use std::sync::LazyLock;

/// Sheets every accepted workbook must contain, in reporting order
pub const REQUIRED_SHEETS: [&str; 10] = [
    "Форма 1",
    "Форма 2",
    "Форма 4",
    "Форма 9",
    "Форма 10",
    "Форма 11",
    "Форма 12",
    "Форма 20",
    "Форма 22",
    "Форма 23",
];

/// One unconditional cell overwrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRewrite {
    pub cell: &'static str,
    pub formula: &'static str,
}

/// A group of rewrites that all land on the same target sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewritePhase {
    pub target_sheet: &'static str,
    pub rewrites: &'static [CellRewrite],
}

const fn rewrite(cell: &'static str, formula: &'static str) -> CellRewrite {
    CellRewrite { cell, formula }
}

/// Rewrite phases, applied in this order
pub const REWRITE_PHASES: [RewritePhase; 3] = [
    RewritePhase {
        target_sheet: "Форма 2",
        rewrites: &[
            rewrite("F21", "='Форма 4'!L13"),
            rewrite("G33", "='Форма 9'!K21"),
            rewrite("G34", "=G33*'Форма 10'!E15/100"),
            rewrite("G43", "=G33*'Форма 11'!F43/100"),
            rewrite("G50", "=G33*'Форма 12'!F28/100"),
        ],
    },
    RewritePhase {
        target_sheet: "Форма 11",
        rewrites: &[
            rewrite("F42", "='Форма 23'!L18"),
            rewrite("I42", "='Форма 23'!Q18"),
        ],
    },
    RewritePhase {
        target_sheet: "Форма 20",
        rewrites: &[
            rewrite("D14", "='Форма 2'!F21"),
            rewrite("C43", "='Форма 2'!G51"),
        ],
    },
];

// Quoted ('Форма 4'!) or bare (Sheet1!) sheet qualifiers
static SHEET_QUALIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:'((?:[^']|'')+)'|([\p{L}_][\p{L}\p{N}_.]*))!").expect("valid regex")
});

/// Sheet names referenced by a formula, in order of first appearance
pub fn referenced_sheets(formula: &str) -> Vec<String> {
    let mut sheets: Vec<String> = Vec::new();
    for caps in SHEET_QUALIFIER.captures_iter(formula) {
        let name = match (caps.get(1), caps.get(2)) {
            (Some(quoted), _) => quoted.as_str().replace("''", "'"),
            (None, Some(bare)) => bare.as_str().to_string(),
            (None, None) => continue,
        };
        if !sheets.contains(&name) {
            sheets.push(name);
        }
    }
    sheets
}

impl RewritePhase {
    /// Every sheet the phase touches: the target first, then each source sheet
    pub fn sheets(&self) -> Vec<String> {
        let mut sheets = vec![self.target_sheet.to_string()];
        for rewrite in self.rewrites {
            for name in referenced_sheets(rewrite.formula) {
                if !sheets.contains(&name) {
                    sheets.push(name);
                }
            }
        }
        sheets
    }
}

/// Total number of cells the table writes
pub fn rewrite_count(phases: &[RewritePhase]) -> usize {
    phases.iter().map(|p| p.rewrites.len()).sum()
}
