use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use tracing::debug;

use crate::sheet::{CellValue, Sheet, SheetError, Workbook};

fn get_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => CellValue::Absent,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                CellValue::from(s.as_str())
            }
            Data::Float(f) => CellValue::Number(*f),
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Bool(b) => CellValue::Text(b.to_string()),
            Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        }
    }
}

/// Reads every sheet of a spreadsheet or CSV file.
///
/// Excel and OpenDocument files keep their sheet order. A CSV file becomes a single sheet
/// named after the file stem.
///
/// # Errors
/// Returns an error if the file cannot be opened or parsed, has an unsupported extension,
/// or holds no sheet at all.
pub fn read_workbook(path: &Path) -> Result<Workbook, SheetError> {
    let workbook = match get_extension(path).as_deref() {
        Some("csv") => read_csv(path)?,
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => read_spreadsheet(path)?,
        _ => {
            return Err(SheetError::UnsupportedFileFormat {
                path: path.display().to_string(),
            });
        }
    };
    if workbook.sheets.is_empty() {
        return Err(SheetError::NoSheets {
            path: path.display().to_string(),
        });
    }
    Ok(workbook)
}

fn read_spreadsheet(path: &Path) -> Result<Workbook, SheetError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)?;
    let sheet_names = workbook.sheet_names().to_vec();

    let mut sheets = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook.worksheet_range(&name)?;
        // the range starts at the first used cell
        let row_offset = range.start().map_or(0, |(row, _)| row as usize);
        let rows: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(CellValue::from).collect())
            .collect();
        debug!(
            "Read sheet '{}' ({} row(s) from row {})",
            name,
            rows.len(),
            row_offset + 1
        );
        sheets.push(Sheet::new(name, rows).with_row_offset(row_offset));
    }
    Ok(Workbook::new(sheets))
}

fn read_csv(path: &Path) -> Result<Workbook, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(CellValue::from).collect());
    }

    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Sheet1")
        .to_string();
    debug!("Read CSV '{}' ({} row(s))", name, rows.len());
    Ok(Workbook::new(vec![Sheet::new(name, rows)]))
}
