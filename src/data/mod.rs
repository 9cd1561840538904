//! Spreadsheet loading. `.csv` files go through the `csv` reader, everything
//! else is handed to calamine (xlsx, xlsm, xls, ods).

use std::collections::HashMap;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataLoadError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Workbook has no worksheets")]
    NoWorksheet,
}

/// One data row, keyed by column header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = HashMap::new();
        for (k, v) in iter {
            // Duplicate headers keep the leftmost column.
            fields.entry(k.into()).or_insert_with(|| v.into());
        }
        Self { fields }
    }
}

pub fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

pub fn load(path: &Path) -> Result<Vec<Record>, DataLoadError> {
    if is_csv(path) {
        load_csv(path)
    } else {
        load_workbook(path)
    }
}

fn load_csv(path: &Path) -> Result<Vec<Record>, DataLoadError> {
    // Short rows are allowed; their missing trailing columns are simply absent.
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        records.push(headers.iter().zip(row.iter()).collect());
    }
    Ok(records)
}

fn load_workbook(path: &Path) -> Result<Vec<Record>, DataLoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(DataLoadError::NoWorksheet)??;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row.iter().map(cell_to_string).collect(),
        None => return Ok(Vec::new()),
    };

    Ok(rows
        .map(|row| {
            headers
                .iter()
                .zip(row.iter())
                .filter(|(header, _)| !header.is_empty())
                .map(|(header, cell)| (header.clone(), cell_to_string(cell)))
                .collect()
        })
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}
