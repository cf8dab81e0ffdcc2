//! Sheet-level parsing: header resolution plus row normalization.

use crate::header::{resolve_headers, HeaderError};
use crate::ranges::RangeError;
use crate::rule::{normalize_row, RowOutcome};
use crate::sheet::Sheet;

/// Error type for `parse` operations.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// No header row in the sheet
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A row holds an invalid network
    #[error("sheet '{sheet}', row {row}: {source}")]
    InvalidNetwork {
        /// Sheet name
        sheet: String,
        /// One-based row number in the sheet
        row: usize,
        /// Tokenizer error
        #[source]
        source: RangeError,
    },
}

/// A normalized row with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    /// Sheet name
    pub sheet: String,
    /// One-based row number in the sheet
    pub row: usize,
    /// Rule or skip reason
    pub outcome: RowOutcome,
}

/// Resolves the header row of `sheet` and normalizes every data row below it.
///
/// # Errors
/// Fails on a missing header row or the first invalid network.
pub fn parse_sheet(sheet: &Sheet) -> Result<Vec<ParsedRow>, ParseError> {
    let resolved = resolve_headers(sheet)?;
    let first_data_row = sheet.row_offset + resolved.header_row + 2;
    resolved
        .rows
        .iter()
        .enumerate()
        .map(|(offset, cells)| {
            let row = first_data_row + offset;
            let outcome =
                normalize_row(cells, &resolved.map).map_err(|source| ParseError::InvalidNetwork {
                    sheet: sheet.name.clone(),
                    row,
                    source,
                })?;
            Ok(ParsedRow {
                sheet: sheet.name.clone(),
                row,
                outcome,
            })
        })
        .collect()
}
