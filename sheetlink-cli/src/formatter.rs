//! Output formatters for previews

use anyhow::Result;
use colored::*;
use sheetlink_core::{CellChange, CellValue};
use std::path::Path;

/// Print planned changes grouped by sheet
pub fn print_human(file_path: &Path, changes: &[CellChange]) {
    println!("{}", format!("[DRY RUN] {}", file_path.display()).bold());
    println!();

    let mut current_sheet: Option<&str> = None;
    for change in changes {
        if current_sheet != Some(change.sheet.as_str()) {
            if current_sheet.is_some() {
                println!();
            }
            println!("{} {}", "Sheet:".bold(), change.sheet.cyan().bold());
            current_sheet = Some(change.sheet.as_str());
        }

        println!(
            "  {} {} {} {}",
            change.cell.yellow(),
            describe_current(change).bright_black(),
            "->".bold(),
            change.new_formula.green()
        );
    }

    println!();
    println!("{} {} cells would be rewritten", "Summary:".bold().underline(), changes.len());
}

fn describe_current(change: &CellChange) -> String {
    if let Some(formula) = &change.current_formula {
        return formula.clone();
    }
    match &change.current_value {
        CellValue::Empty => "(empty)".to_string(),
        CellValue::Number(n) => n.to_string(),
        CellValue::Text(s) => format!("\"{s}\""),
        CellValue::Boolean(b) => b.to_string().to_uppercase(),
        CellValue::Error(e) => e.clone(),
    }
}

/// Print planned changes in JSON format
pub fn print_json(file_path: &Path, changes: &[CellChange]) -> Result<()> {
    let output = serde_json::json!({
        "file": file_path.display().to_string(),
        "changes": changes
            .iter()
            .map(|c| serde_json::json!({
                "sheet": c.sheet,
                "cell": c.cell,
                "current": describe_current(c),
                "formula": c.new_formula,
            }))
            .collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
