//! sheetlink-core: validates form workbooks and links their cells with cross-sheet formulas
//!
//! A workbook is accepted only if it carries every required form sheet. The fixed
//! rewrite table is then applied and the package is written back with every
//! untouched part preserved byte for byte.

pub mod address;
pub mod config;
pub mod error;
pub mod forms;
pub mod pipeline;
pub mod reader;
pub mod rewrite;
pub mod validate;
pub mod writer;

#[cfg(test)]
mod test_support;

pub use address::CellRef;
pub use config::{Config, ProcessorConfig, RecalcConfig};
pub use error::{ErrorClass, ProcessError, Result};
pub use forms::{REQUIRED_SHEETS, REWRITE_PHASES};
pub use pipeline::{CONTENT_TYPE, CellChange, ProcessedFile, Processor, check_extension};
pub use reader::{CellReader, CellValue, Workbook, read_sheet_cells, read_workbook};
pub use writer::{WriteOptions, write_workbook};
