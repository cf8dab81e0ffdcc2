//! Tabular input model.
//!
//! Spreadsheet exports mix numbers, text and blanks in the same column, so every cell is
//! read into a small tagged [`CellValue`] and each consumer applies its own coercion.

mod read;

pub use read::read_workbook;

/// Error type for `sheet` operations.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Spreadsheet could not be opened or a sheet could not be read
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),
    /// CSV parsing error
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    /// The workbook has no sheet at all
    #[error("No sheets found in workbook: {path}")]
    NoSheets {
        /// File path
        path: String,
    },
    /// Unsupported file format
    #[error("Unsupported file format: {path}")]
    UnsupportedFileFormat {
        /// File path
        path: String,
    },
}

/// One loosely typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell, or a cell holding an error value
    Absent,
    /// Text as stored in the sheet
    Text(String),
    /// Any numeric cell (integers, floats, date serials)
    Number(f64),
}

impl CellValue {
    /// True for absent cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Absent => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Trimmed textual form of the cell. Integral numbers print without a fraction.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Absent => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => format_number(*n),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Absent
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_blank)
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A named grid of cells, rows in sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    /// Sheet (tab) name
    pub name: String,
    /// Rows of cells; rows may have different lengths
    pub rows: Vec<Vec<CellValue>>,
    /// Leading sheet rows dropped before `rows[0]`
    pub row_offset: usize,
}

impl Sheet {
    /// Builds a sheet from its name and rows.
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
            row_offset: 0,
        }
    }

    /// Records that `rows[0]` is preceded by `offset` rows left out of the grid.
    pub fn with_row_offset(mut self, offset: usize) -> Self {
        self.row_offset = offset;
        self
    }

    /// True when some row below the first non-blank row holds a value.
    ///
    /// A sheet without such a row (a notes tab, a lone title line) has nothing to parse.
    pub fn has_data_rows(&self) -> bool {
        self.rows
            .iter()
            .skip_while(|row| is_blank_row(row))
            .skip(1)
            .any(|row| !is_blank_row(row))
    }
}

/// All sheets of one input file, in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    /// Sheets in workbook order
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Builds a workbook from its sheets.
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Self { sheets }
    }
}
