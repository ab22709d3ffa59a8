use thiserror::Error;

use crate::aggregate::{self, Table};
use crate::record::Dataset;
use crate::session::DashboardView;

/// Why an export could not be produced
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoded data is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[cfg(feature = "web")]
    #[error("XLSX encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// The tables offered as downloads, with the file name each is saved under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Download {
    Category,
    Region,
    TimeSeries,
    Data,
}

impl Download {
    pub const ALL: [Download; 4] = [
        Download::Category,
        Download::Region,
        Download::TimeSeries,
        Download::Data,
    ];

    /// Looks up a download by the short name used in URLs
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().trim_end_matches(".csv") {
            "category" => Some(Download::Category),
            "region" => Some(Download::Region),
            "timeseries" => Some(Download::TimeSeries),
            "data" => Some(Download::Data),
            _ => None,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Download::Category => "Category.csv",
            Download::Region => "Region.csv",
            Download::TimeSeries => "TimeSeries.csv",
            Download::Data => "Data.csv",
        }
    }
}

/// Convert an aggregated table to CSV text
///
/// # Examples
/// ```
/// use salesboard::aggregate::Table;
/// use salesboard::downloader::table_to_csv;
///
/// let table = Table {
///     headers: vec!["Category".into(), "Sales".into()],
///     rows: vec![vec!["Furniture".into(), "261.96".into()]],
/// };
/// assert_eq!(table_to_csv(&table).unwrap(), "Category,Sales\nFurniture,261.96\n");
/// ```
pub fn table_to_csv(table: &Table) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    finish(writer)
}

/// Convert a dataset to CSV text in the column order of its source file
pub fn dataset_to_csv(dataset: &Dataset) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&dataset.columns)?;
    for record in dataset {
        writer.write_record(dataset.columns.iter().map(|c| record.field(c).into_owned()))?;
    }
    finish(writer)
}

/// Produces the CSV text offered under `download` for the current view
///
/// The grouped tables follow the filters; `Data.csv` holds every row inside
/// the date window regardless of location choices.
pub fn render_download(view: &DashboardView, download: Download) -> Result<String, ExportError> {
    match download {
        Download::Category => {
            table_to_csv(&aggregate::group_table("Category", &view.sales_by_category))
        }
        Download::Region => table_to_csv(&aggregate::group_table("Region", &view.sales_by_region)),
        Download::TimeSeries => table_to_csv(&aggregate::monthly_table(&view.monthly_sales)),
        Download::Data => dataset_to_csv(&view.date_filtered),
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

/// Convert a dataset to XLSX bytes using the rust_xlsxwriter library
///
/// Sales-like columns are written as numbers, everything else as text.
#[cfg(feature = "web")]
pub fn dataset_to_xlsx(dataset: &Dataset) -> Result<Vec<u8>, ExportError> {
    use crate::record::{PROFIT, QUANTITY, SALES};
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name("Data")?;

    for (c, header) in dataset.columns.iter().enumerate() {
        worksheet.write_string(0, c as u16, header.as_str())?;
    }

    for (r, record) in dataset.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, column) in dataset.columns.iter().enumerate() {
            let col = c as u16;
            match column.as_str() {
                SALES => worksheet.write_number(row, col, record.sales)?,
                PROFIT => worksheet.write_number(row, col, record.profit)?,
                QUANTITY => worksheet.write_number(row, col, record.quantity as f64)?,
                other => worksheet.write_string(row, col, &*record.field(other))?,
            };
        }
    }

    workbook.push_worksheet(worksheet);
    Ok(workbook.save_to_buffer()?)
}
