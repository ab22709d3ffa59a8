#![cfg(not(tarpaulin_include))]

use salesboard::aggregate::{self, Table};
use salesboard::downloader::{self, Download};
use salesboard::filter::{DateRange, FilterState, Selection};
use salesboard::loader;
use salesboard::session::{Session, ViewLimits};

use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

const USAGE: &str = "Usage: salesboard-cli <data file> [--start YYYY-MM-DD] [--end YYYY-MM-DD] \
                     [--region A,B] [--state A,B] [--city A,B] [--out DIR]";

#[derive(Default)]
struct Options {
    data: Option<PathBuf>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    filters: FilterState,
    out: Option<PathBuf>,
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, String> {
    loader::parse_date_text(value).ok_or_else(|| format!("{}: cannot read date {:?}", flag, value))
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Options, String> {
    let mut options = Options::default();
    while let Some(arg) = args.next() {
        if !arg.starts_with("--") {
            options.data = Some(PathBuf::from(arg));
            continue;
        }
        let value = args
            .next()
            .ok_or_else(|| format!("missing value for {}", arg))?;
        match arg.as_str() {
            "--start" => options.start = Some(parse_date(&arg, &value)?),
            "--end" => options.end = Some(parse_date(&arg, &value)?),
            "--region" => options.filters.region = Selection::parse_list(&value),
            "--state" => options.filters.state = Selection::parse_list(&value),
            "--city" => options.filters.city = Selection::parse_list(&value),
            "--out" => options.out = Some(PathBuf::from(value)),
            _ => return Err(format!("unknown argument {}", arg)),
        }
    }
    Ok(options)
}

fn print_table(title: &str, table: &Table) {
    println!("\n{}", title);
    if table.rows.is_empty() {
        println!("  (no rows)");
        return;
    }
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.len()).collect();
    for row in &table.rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        println!("  {}", padded.join("  "));
    };
    line(&table.headers);
    for row in &table.rows {
        line(row);
    }
}

fn print_choices(label: &str, candidates: &[String], chosen: &Selection) {
    let chosen: Vec<&str> = chosen.iter().collect();
    println!(
        "{:<7} chosen [{}] of {} candidates: {}",
        label,
        chosen.join(", "),
        candidates.len(),
        candidates.join(", ")
    );
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let s = Instant::now();

    let options = match parse_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Error: {}\n{}", message, USAGE);
            std::process::exit(2);
        }
    };
    let Some(data) = options.data else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let dataset = loader::load_dataset(&data)?;
    let mut session = Session::new(Arc::new(dataset), data.display().to_string());

    let dates = match (options.start, options.end) {
        (None, None) => None,
        (start, end) => {
            let bounds = DateRange::spanning(session.dataset());
            match (start.or(bounds.map(|b| b.start)), end.or(bounds.map(|b| b.end))) {
                (Some(start), Some(end)) => Some(DateRange::new(start, end)?),
                _ => None,
            }
        }
    };
    session.set_filters(dates, options.filters);

    let view = session.view(ViewLimits::default());

    println!("Demo Store Sales Data Analysis: {}", view.source);
    if let Some(range) = view.date_range {
        println!("Order dates {} to {}", range.start, range.end);
    }
    print_choices("Region", &view.candidates.regions, &view.filters.region);
    print_choices("State", &view.candidates.states, &view.filters.state);
    print_choices("City", &view.candidates.cities, &view.filters.city);

    let summary = view.summary;
    println!(
        "\n{} orders, sales {}, profit {}, quantity {}",
        summary.orders,
        aggregate::format_currency(summary.sales),
        aggregate::format_currency(summary.profit),
        summary.quantity
    );

    print_table(
        "Category wise Sales",
        &aggregate::group_table("Category", &view.sales_by_category),
    );
    print_table(
        "Region wise Sales",
        &aggregate::group_table("Region", &view.sales_by_region),
    );
    print_table(
        "Segment wise Sales",
        &aggregate::group_table("Segment", &view.sales_by_segment),
    );
    print_table("Time Series", &aggregate::monthly_table(&view.monthly_sales));
    print_table("Sample", &aggregate::sample_table(&view.sample));
    print_table(
        "Month wise Sub-Category Sales",
        &aggregate::pivot_table(&view.pivot),
    );

    if let Some(out) = options.out {
        std::fs::create_dir_all(&out)?;
        for download in Download::ALL {
            let path = out.join(download.file_name());
            std::fs::write(&path, downloader::render_download(&view, download)?)?;
            println!("wrote {}", path.display());
        }
    }

    let e = s.elapsed().as_secs_f64();
    println!("\nTotal elapsed time: {:.1} seconds", e);

    Ok(())
}
