use super::*;
use std::io::Write;

const SAMPLE: &str = include_str!("../data/sample_superstore.csv");

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn test_sample_superstore_loads() {
    let dataset = from_csv_reader(SAMPLE.as_bytes()).unwrap();
    assert_eq!(dataset.len(), 20);
    assert_eq!(dataset.columns.len(), 18);
    assert_eq!(dataset.columns[2], ORDER_DATE);

    let first = &dataset.records[0];
    assert_eq!(first.order_date, date(2016, 11, 8));
    assert_eq!(first.region, "South");
    assert_eq!(first.state, "Kentucky");
    assert_eq!(first.city, "Henderson");
    assert_eq!(first.category, "Furniture");
    assert_eq!(first.sub_category, "Bookcases");
    assert_eq!(first.segment, "Consumer");
    assert_eq!(first.sales, 261.96);
    assert_eq!(first.quantity, 2);
    assert_eq!(first.extra["Order ID"], "CA-2016-152156");
    assert_eq!(first.extra["Postal Code"], "42420");

    // quoted product name with a comma survives as one field
    assert_eq!(
        dataset.records[1].extra["Product Name"],
        "Hon Deluxe Fabric Upholstered Stacking Chairs, Rounded Back"
    );
    assert!(dataset.records[3].profit < 0.0);
}

#[test]
fn test_headers_match_case_insensitively() {
    let csv = "order date,REGION,State,city,sales\n2017-01-02,East,New York,Albany,10\n";
    let dataset = from_csv_reader(csv.as_bytes()).unwrap();
    assert_eq!(dataset.columns, vec![ORDER_DATE, REGION, STATE, CITY, SALES]);
    assert_eq!(dataset.records[0].city, "Albany");
    assert_eq!(dataset.records[0].sales, 10.0);
    assert!(dataset.records[0].extra.is_empty());
}

#[test]
fn test_repeated_known_header_passes_through() {
    let csv = "Order Date,Region,State,City,Sales,sales,Sales\n\
               2017-01-02,East,New York,Albany,10,20,30\n";
    let dataset = from_csv_reader(csv.as_bytes()).unwrap();
    assert_eq!(
        dataset.columns,
        vec!["Order Date", "Region", "State", "City", "Sales", "sales", "Sales.1"]
    );

    let record = &dataset.records[0];
    assert_eq!(record.sales, 10.0);
    assert_eq!(record.extra["sales"], "20");
    assert_eq!(record.extra["Sales.1"], "30");
    assert_eq!(record.field("sales"), "20");

    let exported = crate::downloader::dataset_to_csv(&dataset).unwrap();
    assert_eq!(
        exported.lines().nth(1),
        Some("2017-01-02,East,New York,Albany,10,20,30")
    );
}

#[test]
fn test_missing_required_column() {
    let csv = "Order Date,Region,City\n1/2/2017,East,Albany\n";
    let err = from_csv_reader(csv.as_bytes()).unwrap_err();
    assert!(matches!(err, IngestionError::MissingColumn("State")));
    assert_eq!(err.to_string(), "missing required column: State");
}

#[test]
fn test_empty_file() {
    let err = from_csv_reader("".as_bytes()).unwrap_err();
    assert!(matches!(err, IngestionError::Empty));
}

#[test]
fn test_invalid_date_reports_row() {
    let csv = "Order Date,Region,State,City\n1/2/2017,East,NY,Albany\nsoon,East,NY,NYC\n";
    match from_csv_reader(csv.as_bytes()).unwrap_err() {
        IngestionError::InvalidDate { row, column, value } => {
            assert_eq!(row, 3);
            assert_eq!(column, ORDER_DATE);
            assert_eq!(value, "soon");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_currency_text_and_blank_measures() {
    let csv = "Order Date,Region,State,City,Sales,Profit,Quantity\n\
               2017-03-04,West,CA,LA,\"$1,234.50\",,3\n";
    let dataset = from_csv_reader(csv.as_bytes()).unwrap();
    let record = &dataset.records[0];
    assert_eq!(record.sales, 1234.5);
    assert_eq!(record.profit, 0.0);
    assert_eq!(record.quantity, 3);
}

#[test]
fn test_invalid_number() {
    let csv = "Order Date,Region,State,City,Sales\n2017-03-04,West,CA,LA,lots\n";
    let err = from_csv_reader(csv.as_bytes()).unwrap_err();
    assert!(matches!(err, IngestionError::InvalidNumber { column: SALES, row: 2, .. }));
}

#[test]
fn test_blank_rows_are_skipped() {
    let csv = "Order Date,Region,State,City\n2017-03-04,West,CA,LA\n,,,\n";
    let dataset = from_csv_reader(csv.as_bytes()).unwrap();
    assert_eq!(dataset.len(), 1);
}

#[test]
fn test_date_text_formats() {
    assert_eq!(parse_date_text("11/8/2016"), Some(date(2016, 11, 8)));
    assert_eq!(parse_date_text("2016-11-08"), Some(date(2016, 11, 8)));
    assert_eq!(parse_date_text("08-11-2016"), Some(date(2016, 11, 8)));
    assert_eq!(parse_date_text("2016-11-08 00:00:00"), Some(date(2016, 11, 8)));
    assert_eq!(parse_date_text("November"), None);
}

#[test]
fn test_excel_serial_dates() {
    assert_eq!(from_excel_serial(42682.0), Some(date(2016, 11, 8)));
    assert_eq!(from_excel_serial(42682.75), Some(date(2016, 11, 8)));
    assert_eq!(from_excel_serial(0.0), None);
    assert_eq!(from_excel_serial(f64::NAN), None);
}

#[test]
fn test_extension_dispatch() {
    assert!(matches!(
        load_bytes("orders.json", Vec::new()),
        Err(IngestionError::UnsupportedExtension(ext)) if ext == "json"
    ));
    assert!(matches!(
        load_bytes("orders", Vec::new()),
        Err(IngestionError::MissingExtension)
    ));
    let dataset = load_bytes("Orders.TXT", SAMPLE.as_bytes().to_vec()).unwrap();
    assert_eq!(dataset.len(), 20);
}

#[test]
fn test_load_dataset_from_disk() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();
    let dataset = load_dataset(file.path()).unwrap();
    assert_eq!(dataset.len(), 20);

    let missing = load_dataset("does/not/exist.csv").unwrap_err();
    assert!(matches!(missing, IngestionError::Io(_)));
}

#[cfg(feature = "web")]
#[test]
fn test_workbook_upload() {
    use rust_xlsxwriter::Workbook;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, header) in ["Order Date", "Region", "State", "City", "Sales", "Ship Mode"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    sheet.write_number(1, 0, 42682.0).unwrap();
    sheet.write_string(1, 1, "South").unwrap();
    sheet.write_string(1, 2, "Kentucky").unwrap();
    sheet.write_string(1, 3, "Henderson").unwrap();
    sheet.write_number(1, 4, 261.96).unwrap();
    sheet.write_string(1, 5, "Second Class").unwrap();
    sheet.write_string(2, 0, "2017-04-15").unwrap();
    sheet.write_string(2, 1, "South").unwrap();
    sheet.write_string(2, 2, "North Carolina").unwrap();
    sheet.write_string(2, 3, "Concord").unwrap();
    sheet.write_number(2, 4, 15.552).unwrap();
    let bytes = workbook.save_to_buffer().unwrap();

    let dataset = load_bytes("upload.xlsx", bytes).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.records[0].order_date, date(2016, 11, 8));
    assert_eq!(dataset.records[0].extra["Ship Mode"], "Second Class");
    assert_eq!(dataset.records[1].order_date, date(2017, 4, 15));
    assert_eq!(dataset.records[1].sales, 15.552);
    assert_eq!(dataset.records[1].extra["Ship Mode"], "");
}
