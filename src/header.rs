//! Header resolution: maps messy, human-edited column headers onto the canonical rule schema.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter};

use crate::sheet::{CellValue, Sheet};

/// Rows scanned below the first row when the first row is not a header.
pub const HEADER_SCAN_ROWS: usize = 10;

/// Error type for `header` operations.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// No row in the search window maps every required field
    #[error("Could not find required headers on sheet '{sheet}'. Saw columns: {seen:?}")]
    NotFound {
        /// Sheet name
        sheet: String,
        /// Non-blank labels of the first row
        seen: Vec<String>,
    },
}

/// Logical fields a rule table exposes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsRefStr, Display, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum CanonicalField {
    /// Direction column
    Type,
    /// Protocol column
    IpProtocol,
    /// First port of the range
    FromPort,
    /// Last port of the range
    ToPort,
    /// CIDR list column
    IpRanges,
    /// Optional free text
    Description,
}

impl CanonicalField {
    /// Normalized header names accepted for this field, in match priority order.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::Type => &["type", "direction"],
            CanonicalField::IpProtocol => &["ipprotocol", "protocol"],
            CanonicalField::FromPort => &["fromport", "srcport", "startport"],
            CanonicalField::ToPort => &["toport", "dstport", "endport"],
            CanonicalField::IpRanges => &[
                "ipranges",
                "cidr",
                "cidrs",
                "source",
                "sources",
                "cidrblocks",
            ],
            CanonicalField::Description => &["description", "desc", "notes", "comment"],
        }
    }

    /// Every field except `description` must be present.
    pub fn is_required(&self) -> bool {
        !matches!(self, CanonicalField::Description)
    }
}

/// A column of the active header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Zero-based column position
    pub index: usize,
    /// Header text as written in the sheet
    pub label: String,
}

/// Canonical field to column mapping for one sheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMap {
    columns: BTreeMap<CanonicalField, ColumnRef>,
}

impl HeaderMap {
    /// Column mapped to `field`, if any.
    pub fn column(&self, field: CanonicalField) -> Option<&ColumnRef> {
        self.columns.get(&field)
    }

    /// Cell of `row` under `field`. Short rows and unmapped fields read as absent.
    pub fn cell<'a>(&self, row: &'a [CellValue], field: CanonicalField) -> &'a CellValue {
        const ABSENT: &CellValue = &CellValue::Absent;
        self.column(field)
            .and_then(|col| row.get(col.index))
            .unwrap_or(ABSENT)
    }

    /// Field to header label pairs, in canonical field order.
    pub fn labels(&self) -> Vec<(CanonicalField, &str)> {
        self.columns
            .iter()
            .map(|(field, col)| (*field, col.label.as_str()))
            .collect()
    }
}

/// A sheet whose header row has been located.
#[derive(Debug, Clone)]
pub struct ResolvedSheet<'a> {
    /// Header mapping
    pub map: HeaderMap,
    /// Zero-based index of the header row
    pub header_row: usize,
    /// Data rows following the header row
    pub rows: &'a [Vec<CellValue>],
}

fn non_alnum() -> &'static Regex {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// Lowercases a header cell and strips everything but ASCII letters and digits.
pub fn normalize_header(cell: &CellValue) -> String {
    let text = cell.as_text().replace('\u{00A0}', " ").to_lowercase();
    non_alnum().replace_all(text.trim(), "").into_owned()
}

/// Tries to read `row` as a header row.
///
/// Returns `None` when a required field has no matching column. When several columns
/// normalize to the same name, the leftmost one is used.
pub fn try_map(row: &[CellValue]) -> Option<HeaderMap> {
    let mut seen: HashMap<String, ColumnRef> = HashMap::new();
    for (index, cell) in row.iter().enumerate() {
        let key = normalize_header(cell);
        if key.is_empty() {
            continue;
        }
        seen.entry(key).or_insert_with(|| ColumnRef {
            index,
            label: cell.as_text(),
        });
    }

    let mut columns = BTreeMap::new();
    for field in CanonicalField::iter() {
        match field.synonyms().iter().find_map(|syn| seen.get(*syn)) {
            Some(col) => {
                columns.insert(field, col.clone());
            }
            None if field.is_required() => return None,
            None => {}
        }
    }
    Some(HeaderMap { columns })
}

/// Locates the header row of `sheet`.
///
/// The first row is tried first, then each of the next [`HEADER_SCAN_ROWS`] rows; the
/// first row that maps every required field wins and data starts right after it.
///
/// # Errors
/// Returns [`HeaderError::NotFound`] when no row in that window qualifies.
pub fn resolve_headers(sheet: &Sheet) -> Result<ResolvedSheet<'_>, HeaderError> {
    let window = sheet.rows.len().min(HEADER_SCAN_ROWS + 1);
    (0..window)
        .find_map(|idx| try_map(&sheet.rows[idx]).map(|map| (idx, map)))
        .map(|(header_row, map)| ResolvedSheet {
            map,
            header_row,
            rows: &sheet.rows[header_row + 1..],
        })
        .ok_or_else(|| HeaderError::NotFound {
            sheet: sheet.name.clone(),
            seen: sheet
                .rows
                .first()
                .map(|row| {
                    row.iter()
                        .filter(|cell| !cell.is_blank())
                        .map(CellValue::as_text)
                        .collect()
                })
                .unwrap_or_default(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header(&CellValue::from(" Ip Protocol ")), "ipprotocol");
        assert_eq!(normalize_header(&CellValue::from("From-Port")), "fromport");
        assert_eq!(normalize_header(&CellValue::from("CIDR\u{00A0}Blocks")), "cidrblocks");
        assert_eq!(normalize_header(&CellValue::Number(3.0)), "3");
        assert_eq!(normalize_header(&CellValue::Absent), "");
    }

    #[test]
    fn test_first_row_fast_path() {
        let sheet = Sheet::new(
            "Rules",
            vec![
                row(&["Type", "IpProtocol", "FromPort", "ToPort", "IpRanges", "Description"]),
                row(&["Inbound", "tcp", "443", "443", "0.0.0.0/0", "HTTPS"]),
            ],
        );
        let resolved = resolve_headers(&sheet).unwrap();
        assert_eq!(resolved.header_row, 0);
        assert_eq!(resolved.rows.len(), 1);
        assert_eq!(
            resolved.map.column(CanonicalField::Description).unwrap().index,
            5
        );
    }

    #[test]
    fn test_header_found_below_banner_rows() {
        let sheet = Sheet::new(
            "Export",
            vec![
                row(&["Firewall export", "", ""]),
                row(&["generated by inventory"]),
                row(&[]),
                row(&["Direction", "Protocol", "Src Port", "Dst Port", "CIDR"]),
                row(&["Outbound", "udp", "53", "53", "10.0.0.2/32"]),
            ],
        );
        let resolved = resolve_headers(&sheet).unwrap();
        assert_eq!(resolved.header_row, 3);
        assert_eq!(resolved.rows.len(), 1);
        assert!(resolved.map.column(CanonicalField::Description).is_none());
    }

    #[test]
    fn test_header_on_last_scanned_row() {
        let mut rows: Vec<Vec<CellValue>> =
            (0..HEADER_SCAN_ROWS).map(|_| row(&["x"])).collect();
        rows.push(row(&["Type", "IpProtocol", "FromPort", "ToPort", "IpRanges"]));
        rows.push(row(&["Inbound", "tcp", "22", "22", "10.0.0.0/8"]));
        let sheet = Sheet::new("Edge", rows);
        let resolved = resolve_headers(&sheet).unwrap();
        assert_eq!(resolved.header_row, HEADER_SCAN_ROWS);
        assert_eq!(resolved.rows.len(), 1);
    }

    #[test]
    fn test_header_outside_window_is_error() {
        let mut rows: Vec<Vec<CellValue>> =
            (0..=HEADER_SCAN_ROWS).map(|_| row(&["x"])).collect();
        rows.push(row(&["Type", "IpProtocol", "FromPort", "ToPort", "IpRanges"]));
        let sheet = Sheet::new("Late", rows);
        match resolve_headers(&sheet) {
            Err(HeaderError::NotFound { sheet, seen }) => {
                assert_eq!(sheet, "Late");
                assert_eq!(seen, vec!["x".to_string()]);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_field() {
        assert!(try_map(&row(&["Type", "IpProtocol", "FromPort", "IpRanges"])).is_none());
    }

    #[test]
    fn test_order_independent() {
        let a = try_map(&row(&["Type", "IpProtocol", "FromPort", "ToPort", "IpRanges", "Notes"]))
            .unwrap();
        let b = try_map(&row(&["Notes", "IpRanges", "ToPort", "", "Type", "FromPort", "IpProtocol"]))
            .unwrap();
        assert_eq!(a.labels(), b.labels());
    }

    #[test]
    fn test_leftmost_duplicate_wins() {
        let map = try_map(&row(&["Type", "Protocol", "ip protocol", "FromPort", "ToPort", "Cidr"]))
            .unwrap();
        // "ipprotocol" has priority over "protocol" in the synonym list
        assert_eq!(map.column(CanonicalField::IpProtocol).unwrap().index, 2);
        let map = try_map(&row(&["Type", "Protocol", "FromPort", "ToPort", "Cidr", "CIDR"]))
            .unwrap();
        assert_eq!(map.column(CanonicalField::IpRanges).unwrap().index, 4);
    }

    #[test]
    fn test_cell_on_short_row_is_absent() {
        let map = try_map(&row(&["Type", "IpProtocol", "FromPort", "ToPort", "IpRanges", "Desc"]))
            .unwrap();
        let short = row(&["Inbound", "tcp"]);
        assert_eq!(map.cell(&short, CanonicalField::Description), &CellValue::Absent);
        assert_eq!(map.cell(&short, CanonicalField::IpProtocol), &CellValue::from("tcp"));
    }

    #[test]
    fn test_field_names() {
        assert_eq!(CanonicalField::IpProtocol.as_ref(), "ipprotocol");
        assert_eq!(CanonicalField::IpRanges.to_string(), "ipranges");
    }
}
