//! Error taxonomy for the processing pipeline

use thiserror::Error;

/// Whether a failure is the caller's fault or ours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The upload itself is unacceptable (HTTP 400)
    Client,
    /// The upload was acceptable but processing failed (HTTP 500)
    Server,
}

/// Every way a single workbook can fail to be processed
///
/// Display strings are the user-facing messages returned to the caller.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Только XLSX файлы")]
    InvalidFormat,

    #[error("Отсутствуют формы: {}", .0.join(", "))]
    MissingSheets(Vec<String>),

    #[error("Ошибка обработки: {0}")]
    CorruptWorkbook(String),

    #[error("Ошибка обработки: лист '{0}' не найден")]
    SheetNotFound(String),

    #[error("Ошибка обработки: некорректный адрес ячейки '{0}'")]
    InvalidCellRef(String),

    #[error("Ошибка обработки: {0}")]
    Serialize(String),
}

impl ProcessError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ProcessError::InvalidFormat | ProcessError::MissingSheets(_) => ErrorClass::Client,
            ProcessError::CorruptWorkbook(_)
            | ProcessError::SheetNotFound(_)
            | ProcessError::InvalidCellRef(_)
            | ProcessError::Serialize(_) => ErrorClass::Server,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }

    /// Malformed XML inside a package part
    pub(crate) fn xml(part: &str, e: impl std::fmt::Display) -> Self {
        ProcessError::CorruptWorkbook(format!("{part}: XML parsing error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;
