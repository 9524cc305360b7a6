use std::fs;
use std::io::Write;

use calamine::{Data, Reader, Xlsx, open_workbook};
use camino::Utf8Path;
use rust_xlsxwriter::Workbook;

use crate::domain::{IdentifierColumn, OfferRecord, clean_text};
use crate::error::SourcingError;

pub const OFFER_HEADERS: [&str; 8] = [
    "MPN",
    "Manufacturer",
    "SellerID",
    "SellerName",
    "Stock",
    "Quantity",
    "Price",
    "Currency",
];

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<Option<i64>> for CellValue {
    fn from(value: Option<i64>) -> Self {
        value
            .map(|v| CellValue::Number(v as f64))
            .unwrap_or(CellValue::Empty)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map(CellValue::Number).unwrap_or(CellValue::Empty)
    }
}

/// Reads the identifier column of the first worksheet.
///
/// The first row is the header. Blank identifier cells are skipped, every
/// other value goes through [`clean_text`].
pub fn read_identifiers(
    path: &Utf8Path,
    column: &IdentifierColumn,
) -> Result<Vec<String>, SourcingError> {
    if !path.as_std_path().exists() {
        return Err(SourcingError::InputNotFound(path.to_string()));
    }

    let mut workbook: Xlsx<_> = open_workbook(path.as_std_path())
        .map_err(|err: calamine::XlsxError| SourcingError::MalformedInput(err.to_string()))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SourcingError::MalformedInput(format!("{path}: workbook has no sheets")))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|err| SourcingError::MalformedInput(err.to_string()))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| SourcingError::EmptyInput(path.to_string()))?;
    let index = match column {
        IdentifierColumn::First => {
            if header.is_empty() {
                return Err(SourcingError::MalformedInput(format!(
                    "{path}: sheet has no first column"
                )));
            }
            0
        }
        IdentifierColumn::Named(name) => header
            .iter()
            .position(|cell| cell_text(cell) == *name)
            .ok_or_else(|| {
                SourcingError::MalformedInput(format!("{path}: missing column '{name}'"))
            })?,
    };

    let mut data_rows = 0usize;
    let mut identifiers = Vec::new();
    for row in rows {
        data_rows += 1;
        let value = row.get(index).map(cell_text).unwrap_or_default();
        if !value.is_empty() {
            identifiers.push(value);
        }
    }

    if data_rows == 0 || identifiers.is_empty() {
        return Err(SourcingError::EmptyInput(path.to_string()));
    }
    Ok(identifiers)
}

pub fn offer_row(record: &OfferRecord) -> Vec<CellValue> {
    vec![
        CellValue::from(record.mpn.as_str()),
        CellValue::from(record.manufacturer.as_str()),
        CellValue::from(record.seller_id.as_str()),
        CellValue::from(record.seller_name.as_str()),
        CellValue::from(record.stock),
        CellValue::from(record.quantity),
        CellValue::from(record.price),
        CellValue::from(record.currency.as_str()),
    ]
}

pub fn write_offers(path: &Utf8Path, records: &[OfferRecord]) -> Result<(), SourcingError> {
    let rows = records.iter().map(offer_row).collect::<Vec<_>>();
    write_rows(path, &OFFER_HEADERS, &rows)
}

/// Writes a single-sheet workbook, replacing `path` only once the whole file
/// is on disk.
pub fn write_rows(
    path: &Utf8Path,
    headers: &[&str],
    rows: &[Vec<CellValue>],
) -> Result<(), SourcingError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in headers.iter().enumerate() {
        sheet
            .write_string(0, column_index(col)?, *header)
            .map_err(|err| SourcingError::Spreadsheet(err.to_string()))?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        let row_num = u32::try_from(row_idx + 1)
            .map_err(|_| SourcingError::Spreadsheet("too many rows".to_string()))?;
        for (col, cell) in row.iter().enumerate() {
            let col = column_index(col)?;
            let written = match cell {
                CellValue::Text(value) if value.is_empty() => continue,
                CellValue::Text(value) => sheet.write_string(row_num, col, value.as_str()),
                CellValue::Number(value) => sheet.write_number(row_num, col, *value),
                CellValue::Empty => continue,
            };
            written.map_err(|err| SourcingError::Spreadsheet(err.to_string()))?;
        }
    }
    let buffer = workbook
        .save_to_buffer()
        .map_err(|err| SourcingError::Spreadsheet(err.to_string()))?;
    write_bytes_atomic(path, &buffer)
}

fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SourcingError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SourcingError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".part-sourcing")
        .suffix(".tmp")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SourcingError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| SourcingError::Filesystem(err.to_string()))?;
    temp.flush()
        .map_err(|err| SourcingError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SourcingError::Filesystem(err.to_string()))?;
    Ok(())
}

fn column_index(col: usize) -> Result<u16, SourcingError> {
    u16::try_from(col).map_err(|_| SourcingError::Spreadsheet("too many columns".to_string()))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(value) => clean_text(value),
        Data::Empty => String::new(),
        other => clean_text(&other.to_string()),
    }
}
