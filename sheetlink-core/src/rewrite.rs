//! Applies the cross-sheet rewrite table to a workbook

use tracing::debug;

use crate::error::Result;
use crate::forms::RewritePhase;
use crate::reader::Workbook;

/// Apply one phase: open every sheet it touches, then overwrite its target cells
///
/// Returns the number of cells written.
pub fn apply_phase(workbook: &mut Workbook, phase: &RewritePhase) -> Result<usize> {
    let sheets = phase.sheets();
    for name in &sheets {
        workbook.sheet(name)?;
    }
    debug!(target_sheet = phase.target_sheet, sheets = ?sheets, "phase sheets opened");

    for rewrite in phase.rewrites {
        workbook.set_formula(phase.target_sheet, rewrite.cell, rewrite.formula)?;
        debug!(
            sheet = phase.target_sheet,
            cell = rewrite.cell,
            formula = rewrite.formula,
            "cell rewritten"
        );
    }

    Ok(phase.rewrites.len())
}

/// Apply every phase in order
pub fn apply_rewrites(workbook: &mut Workbook, phases: &[RewritePhase]) -> Result<usize> {
    let mut written = 0;
    for phase in phases {
        written += apply_phase(workbook, phase)?;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::forms::{CellRewrite, REWRITE_PHASES, rewrite_count};
    use crate::test_support::{PackageBuilder, all_forms};

    #[test]
    fn test_apply_full_table() {
        let mut workbook = Workbook::from_bytes(all_forms().build()).unwrap();
        let written = apply_rewrites(&mut workbook, &REWRITE_PHASES).unwrap();

        assert_eq!(written, 9);
        assert_eq!(workbook.edit_count(), rewrite_count(&REWRITE_PHASES));
        assert_eq!(workbook.pending_formula("Форма 2", "G34"), Some("=G33*'Форма 10'!E15/100"));
        assert_eq!(workbook.pending_formula("Форма 11", "I42"), Some("='Форма 23'!Q18"));
        assert_eq!(workbook.pending_formula("Форма 20", "C43"), Some("='Форма 2'!G51"));
        assert_eq!(workbook.pending_formula("Форма 1", "A1"), None);
    }

    #[test]
    fn test_reapplying_is_idempotent() {
        let mut workbook = Workbook::from_bytes(all_forms().build()).unwrap();
        apply_rewrites(&mut workbook, &REWRITE_PHASES).unwrap();
        let once = workbook.edits.clone();

        apply_rewrites(&mut workbook, &REWRITE_PHASES).unwrap();
        assert_eq!(workbook.edits, once);
    }

    #[test]
    fn test_missing_source_sheet_fails_before_writing() {
        let bytes = PackageBuilder::default()
            .sheet("Форма 20", "")
            .build();
        let mut workbook = Workbook::from_bytes(bytes).unwrap();

        let err = apply_phase(&mut workbook, &REWRITE_PHASES[2]).unwrap_err();
        assert!(matches!(err, ProcessError::SheetNotFound(ref name) if name == "Форма 2"));
        assert!(!err.is_client_error());
        assert!(!workbook.has_edits());
    }

    #[test]
    fn test_missing_target_sheet() {
        let phase = RewritePhase {
            target_sheet: "Форма 7",
            rewrites: &[CellRewrite {
                cell: "A1",
                formula: "=1",
            }],
        };
        let mut workbook = Workbook::from_bytes(all_forms().build()).unwrap();

        let err = apply_phase(&mut workbook, &phase).unwrap_err();
        assert!(matches!(err, ProcessError::SheetNotFound(ref name) if name == "Форма 7"));
    }
}
