use calamine::{Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

use crate::record::{
    CATEGORY, CITY, Dataset, ORDER_DATE, PROFIT, QUANTITY, REGION, REQUIRED_COLUMNS, Record,
    SALES, SEGMENT, STATE, SUB_CATEGORY,
};

lazy_static! {
    static ref NUMBER_NOISE: Regex = Regex::new(r"[$,\s]").unwrap();
}

/// Extensions accepted for upload and for the default dataset
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["csv", "txt", "xlsx", "xls"];

const DATE_FORMATS: [&str; 4] = ["%m/%d/%Y", "%Y-%m-%d", "%d-%m-%Y", "%m/%d/%y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

const KNOWN_COLUMNS: [&str; 10] = [
    ORDER_DATE,
    REGION,
    STATE,
    CITY,
    CATEGORY,
    SUB_CATEGORY,
    SEGMENT,
    SALES,
    PROFIT,
    QUANTITY,
];

/// Why a source file could not be turned into a dataset
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed spreadsheet: {0}")]
    Excel(#[from] calamine::Error),

    #[error("unsupported file extension: {0} (expected csv, txt, xlsx or xls)")]
    UnsupportedExtension(String),

    #[error("file has no extension")]
    MissingExtension,

    #[error("file has no header row")]
    Empty,

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("row {row}: cannot read {value:?} in column {column} as a date")]
    InvalidDate {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row}: cannot read {value:?} in column {column} as a number")]
    InvalidNumber {
        row: usize,
        column: &'static str,
        value: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FileKind {
    Delimited,
    Workbook,
}

fn file_kind(file_name: &Path) -> Result<FileKind, IngestionError> {
    let extension = file_name
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") | Some("txt") => Ok(FileKind::Delimited),
        Some("xlsx") | Some("xls") => Ok(FileKind::Workbook),
        Some(ext) => Err(IngestionError::UnsupportedExtension(ext.to_string())),
        None => Err(IngestionError::MissingExtension),
    }
}

/// Load a dataset from disk, picking the parser from the file extension
///
/// # Examples
/// ```no_run
/// use salesboard::loader::load_dataset;
///
/// match load_dataset("Superstore.xls") {
///     Ok(dataset) => println!("Loaded {} orders", dataset.len()),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Dataset, IngestionError> {
    let path = path.as_ref();
    let dataset = match file_kind(path)? {
        FileKind::Delimited => from_csv(path)?,
        FileKind::Workbook => from_excel(path)?,
    };
    log::info!("loaded {} rows from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// Load an uploaded file held in memory; `file_name` only selects the parser
pub fn load_bytes(file_name: &str, bytes: Vec<u8>) -> Result<Dataset, IngestionError> {
    let dataset = match file_kind(Path::new(file_name))? {
        FileKind::Delimited => from_csv_reader(Cursor::new(bytes))?,
        FileKind::Workbook => from_excel_bytes(bytes)?,
    };
    log::info!("loaded {} rows from upload {}", dataset.len(), file_name);
    Ok(dataset)
}

pub fn from_csv(path: impl AsRef<Path>) -> Result<Dataset, IngestionError> {
    let file = std::fs::File::open(path)?;
    from_csv_reader(std::io::BufReader::new(file))
}

/// Parse comma-separated text with a header row
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, since
/// spreadsheet exports are often Latin-1.
pub fn from_csv_reader<R: Read>(reader: R) -> Result<Dataset, IngestionError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();
    let layout = Layout::from_headers(headers)?;

    let mut records = Vec::new();
    for (i, row) in reader.byte_records().enumerate() {
        let row = row?;
        let cells: Vec<RawCell> = row
            .iter()
            .map(|field| RawCell::from_text(&String::from_utf8_lossy(field)))
            .collect();
        if let Some(record) = layout.record(&cells, i + 2)? {
            records.push(record);
        }
    }

    Ok(Dataset::new(layout.columns, records))
}

pub fn from_excel(path: impl AsRef<Path>) -> Result<Dataset, IngestionError> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    read_first_sheet(&mut workbook)
}

pub fn from_excel_bytes(bytes: Vec<u8>) -> Result<Dataset, IngestionError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))?;
    read_first_sheet(&mut workbook)
}

fn read_first_sheet<RS>(workbook: &mut calamine::Sheets<RS>) -> Result<Dataset, IngestionError>
where
    RS: std::io::Read + std::io::Seek,
{
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => range?,
        None => return Err(IngestionError::Empty),
    };

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| RawCell::from_excel(cell).text())
            .collect(),
        None => return Err(IngestionError::Empty),
    };
    let layout = Layout::from_headers(headers)?;

    let mut records = Vec::new();
    for (i, row) in rows.enumerate() {
        let cells: Vec<RawCell> = row.iter().map(RawCell::from_excel).collect();
        if let Some(record) = layout.record(&cells, i + 2)? {
            records.push(record);
        }
    }

    Ok(Dataset::new(layout.columns, records))
}

/// A cell before it is interpreted against its column
#[derive(Clone, Debug, PartialEq)]
enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    /// Excel date serial (days since 1899-12-30)
    Serial(f64),
}

impl RawCell {
    fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            RawCell::Empty
        } else {
            RawCell::Text(text.to_string())
        }
    }

    fn from_excel(cell: &Data) -> Self {
        match cell {
            Data::Int(i) => RawCell::Number(*i as f64),
            Data::Float(f) => RawCell::Number(*f),
            Data::DateTime(dt) => RawCell::Serial(dt.as_f64()),
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
                RawCell::from_text(s)
            }
            Data::Bool(b) => RawCell::Text(b.to_string()),
            Data::Error(_) | Data::Empty => RawCell::Empty,
        }
    }

    fn text(&self) -> String {
        match self {
            RawCell::Empty => String::new(),
            RawCell::Text(s) => s.clone(),
            RawCell::Number(n) | RawCell::Serial(n) => format_number(*n),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Where each known column sits in the source rows
struct Layout {
    columns: Vec<String>,
    known: HashMap<&'static str, usize>,
}

impl Layout {
    fn from_headers(headers: Vec<String>) -> Result<Self, IngestionError> {
        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestionError::Empty);
        }

        let mut columns = headers;
        let mut known = HashMap::new();
        for i in 0..columns.len() {
            let Some(name) = KNOWN_COLUMNS
                .iter()
                .copied()
                .find(|name| name.eq_ignore_ascii_case(columns[i].trim()))
            else {
                continue;
            };
            if !known.contains_key(name) {
                known.insert(name, i);
                columns[i] = name.to_string();
            } else if columns[i] == name {
                // later copies pass through under their own header, suffixed
                // when it would collide with the canonical one
                columns[i] = unique_header(&columns, name);
            }
        }

        for required in REQUIRED_COLUMNS {
            if !known.contains_key(required) {
                return Err(IngestionError::MissingColumn(required));
            }
        }

        Ok(Layout { columns, known })
    }

    fn cell<'a>(&self, cells: &'a [RawCell], column: &'static str) -> &'a RawCell {
        self.known
            .get(column)
            .and_then(|&i| cells.get(i))
            .unwrap_or(&RawCell::Empty)
    }

    /// Builds the record for one row; blank rows give `None`
    fn record(&self, cells: &[RawCell], row: usize) -> Result<Option<Record>, IngestionError> {
        if cells.iter().all(|c| *c == RawCell::Empty) {
            return Ok(None);
        }

        let order_date = parse_date(self.cell(cells, ORDER_DATE), row)?;
        let mut record = Record::new(
            order_date,
            &self.cell(cells, REGION).text(),
            &self.cell(cells, STATE).text(),
            &self.cell(cells, CITY).text(),
        );
        record.category = self.cell(cells, CATEGORY).text();
        record.sub_category = self.cell(cells, SUB_CATEGORY).text();
        record.segment = self.cell(cells, SEGMENT).text();
        record.sales = parse_number(self.cell(cells, SALES), SALES, row)?;
        record.profit = parse_number(self.cell(cells, PROFIT), PROFIT, row)?;
        record.quantity = parse_number(self.cell(cells, QUANTITY), QUANTITY, row)?.round() as i64;

        let mut extra = BTreeMap::new();
        for (i, header) in self.columns.iter().enumerate() {
            if self.known.values().any(|&k| k == i) {
                continue;
            }
            let value = cells.get(i).map(RawCell::text).unwrap_or_default();
            extra.insert(header.clone(), value);
        }
        record.extra = extra;

        Ok(Some(record))
    }
}

/// `name.1`, `name.2`, ... whichever is free first
fn unique_header(columns: &[String], name: &str) -> String {
    let mut n = 1;
    loop {
        let candidate = format!("{}.{}", name, n);
        if !columns.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn parse_date(cell: &RawCell, row: usize) -> Result<NaiveDate, IngestionError> {
    let invalid = || IngestionError::InvalidDate {
        row,
        column: ORDER_DATE,
        value: cell.text(),
    };

    match cell {
        RawCell::Serial(serial) | RawCell::Number(serial) => {
            from_excel_serial(*serial).ok_or_else(invalid)
        }
        RawCell::Text(text) => parse_date_text(text).ok_or_else(invalid),
        RawCell::Empty => Err(invalid()),
    }
}

/// Reads the date part of the textual formats spreadsheets export
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    None
}

fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_number(cell: &RawCell, column: &'static str, row: usize) -> Result<f64, IngestionError> {
    match cell {
        RawCell::Empty => Ok(0.0),
        RawCell::Number(n) | RawCell::Serial(n) => Ok(*n),
        RawCell::Text(text) => {
            let cleaned = NUMBER_NOISE.replace_all(text, "");
            cleaned
                .parse::<f64>()
                .map_err(|_| IngestionError::InvalidNumber {
                    row,
                    column,
                    value: text.clone(),
                })
        }
    }
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
