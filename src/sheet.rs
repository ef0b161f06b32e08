//! Shared tabular layer over the two supported report formats.
//!
//! Reports arrive either as delimited text or as xlsx workbooks; both are
//! normalized into a [`Table`] of trimmed string cells before any attendance
//! logic runs. Session reports and the student registry are written back as
//! xlsx via an in-memory buffer.

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Returns true for the two supported report formats.
pub fn is_report_file(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    lower.ends_with(".csv") || lower.ends_with(".xlsx")
}

/// A parsed sheet: a header row plus data rows of string cells.
#[derive(Debug, Default, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a header, matched exactly after trimming.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at (row, column name); empty cells come back as `None`.
    pub fn cell(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows
            .get(row)?
            .get(idx)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// All non-empty values of a column, in row order. An absent column
    /// yields the empty list, not an error.
    pub fn column(&self, name: &str) -> Vec<String> {
        let Some(idx) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .filter_map(|row| row.get(idx))
            .filter(|v| !v.is_empty())
            .cloned()
            .collect()
    }
}

/// Parses report bytes according to the file extension.
pub fn parse_table(key: &str, bytes: &[u8]) -> Result<Table> {
    if key.to_ascii_lowercase().ends_with(".csv") {
        parse_csv(bytes)
    } else {
        parse_xlsx(bytes)
    }
}

/// Delimited-text parse: first row is the header. Rows may be ragged.
pub fn parse_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.trim().to_string()).collect());
    }

    if rows.is_empty() {
        return Ok(Table::default());
    }
    let headers = rows.remove(0);
    Ok(Table { headers, rows })
}

/// Reads the first worksheet of an xlsx workbook.
pub fn parse_xlsx(bytes: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).context("not a valid xlsx workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no sheets")??;

    let mut rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    if rows.is_empty() {
        return Ok(Table::default());
    }
    let headers = rows.remove(0);
    Ok(Table { headers, rows })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
    }
}

/// Writes named sheets of string rows into an in-memory xlsx workbook.
pub fn write_workbook(sheets: &[(String, Vec<Vec<String>>)]) -> Result<Vec<u8>> {
    let mut workbook = rust_xlsxwriter::Workbook::new();

    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name)?;
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                worksheet.write_string(r as u32, c as u16, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}
