//! Cell inspection using calamine

use calamine::{Data, Range, Reader, Xlsx, open_workbook_from_rs};
use std::collections::HashMap;
use std::io::Cursor;

use crate::address::CellRef;
use crate::error::{ProcessError, Result};

/// Cell value types
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
}

/// Represents a single cell: its cached value and its formula, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Formula text with a leading `=`
    pub formula: Option<String>,
}

/// Every non-empty cell of one sheet
#[derive(Debug, Clone, Default)]
pub struct SheetCells {
    pub name: String,
    pub cells: HashMap<CellRef, Cell>,
}

impl SheetCells {
    pub fn get(&self, a1: &str) -> Option<&Cell> {
        self.cells.get(&CellRef::from_a1(a1)?)
    }

    pub fn formula(&self, a1: &str) -> Option<&str> {
        self.get(a1)?.formula.as_deref()
    }
}

/// An opened workbook, for reading several sheets from one parse
pub struct CellReader<'a> {
    excel: Xlsx<Cursor<&'a [u8]>>,
}

impl<'a> CellReader<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let excel = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes))
            .map_err(|e| ProcessError::CorruptWorkbook(e.to_string()))?;
        Ok(Self { excel })
    }

    /// Values and formulas of one sheet
    pub fn sheet(&mut self, sheet_name: &str) -> Result<SheetCells> {
        if !self.excel.sheet_names().iter().any(|name| name == sheet_name) {
            return Err(ProcessError::SheetNotFound(sheet_name.to_string()));
        }

        let values = self
            .excel
            .worksheet_range(sheet_name)
            .map_err(|e| ProcessError::CorruptWorkbook(e.to_string()))?;
        let formulas = self
            .excel
            .worksheet_formula(sheet_name)
            .map_err(|e| ProcessError::CorruptWorkbook(e.to_string()))?;

        Ok(parse_sheet(sheet_name, &values, &formulas))
    }
}

/// Read values and formulas of one sheet from serialized workbook bytes
pub fn read_sheet_cells(bytes: &[u8], sheet_name: &str) -> Result<SheetCells> {
    CellReader::open(bytes)?.sheet(sheet_name)
}

fn parse_sheet(name: &str, values: &Range<Data>, formulas: &Range<String>) -> SheetCells {
    let mut cells: HashMap<CellRef, Cell> = HashMap::new();

    if let Some((start_row, start_col)) = values.start() {
        for (row, col, data) in values.used_cells() {
            let cell_ref = CellRef::new(start_row + row as u32, start_col + col as u32);
            cells.insert(
                cell_ref,
                Cell {
                    value: parse_cell_value(data),
                    formula: None,
                },
            );
        }
    }

    if let Some((start_row, start_col)) = formulas.start() {
        for (row, col, formula) in formulas.used_cells() {
            let cell_ref = CellRef::new(start_row + row as u32, start_col + col as u32);
            let cell = cells.entry(cell_ref).or_insert(Cell {
                value: CellValue::Empty,
                formula: None,
            });
            cell.formula = Some(format!("={formula}"));
        }
    }

    SheetCells {
        name: name.to_string(),
        cells,
    }
}

fn parse_cell_value(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        Data::Empty => CellValue::Empty,
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}
