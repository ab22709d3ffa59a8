//! Group-by sums, pivots and the other small tables the dashboard shows.
//!
//! Everything here reads a dataset that has already been date-filtered and
//! resolved; nothing filters on its own.

use chrono::{Datelike, Month, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::record::{CATEGORY, CITY, Dataset, PROFIT, QUANTITY, REGION, Record, SALES, STATE};

/// Sales summed over one group
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupTotal {
    pub key: String,
    pub sales: f64,
}

/// Sales summed over one calendar month
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthTotal {
    pub year: i32,
    pub month: u32,
    /// `"2016 : Nov"`
    pub month_year: String,
    pub sales: f64,
}

/// One level of the Region → Category → Sub-Category tree
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub name: String,
    pub sales: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

/// Average sales per Sub-Category and month name
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Pivot {
    /// Month names present in the data, in calendar order
    pub months: Vec<String>,
    pub rows: Vec<PivotRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PivotRow {
    pub sub_category: String,
    /// One entry per `Pivot::months`; `None` where no order fell in that month
    pub values: Vec<Option<f64>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub sales: f64,
    pub profit: f64,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleRow {
    pub region: String,
    pub state: String,
    pub city: String,
    pub category: String,
    pub sales: f64,
    pub profit: f64,
    pub quantity: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Summary {
    pub orders: usize,
    pub sales: f64,
    pub profit: f64,
    pub quantity: i64,
}

/// A rendered table: header row plus text cells, ready for CSV or display
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Sum of Sales per key, keys in ascending order
pub fn sales_by<F>(dataset: &Dataset, key: F) -> Vec<GroupTotal>
where
    F: Fn(&Record) -> &str,
{
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for record in dataset {
        *totals.entry(key(record)).or_insert(0.0) += record.sales;
    }
    totals
        .into_iter()
        .map(|(key, sales)| GroupTotal {
            key: key.to_string(),
            sales,
        })
        .collect()
}

pub fn sales_by_category(dataset: &Dataset) -> Vec<GroupTotal> {
    sales_by(dataset, |r| r.category.as_str())
}

pub fn sales_by_region(dataset: &Dataset) -> Vec<GroupTotal> {
    sales_by(dataset, |r| r.region.as_str())
}

pub fn sales_by_segment(dataset: &Dataset) -> Vec<GroupTotal> {
    sales_by(dataset, |r| r.segment.as_str())
}

/// Monthly sales in chronological order
pub fn monthly_sales(dataset: &Dataset) -> Vec<MonthTotal> {
    let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for record in dataset {
        let key = (record.order_date.year(), record.order_date.month());
        *totals.entry(key).or_insert(0.0) += record.sales;
    }
    totals
        .into_iter()
        .filter_map(|((year, month), sales)| {
            let first = NaiveDate::from_ymd_opt(year, month, 1)?;
            Some(MonthTotal {
                year,
                month,
                month_year: first.format("%Y : %b").to_string(),
                sales,
            })
        })
        .collect()
}

/// Region → Category → Sub-Category sales tree, each level sorted by name
pub fn sales_hierarchy(dataset: &Dataset) -> Vec<HierarchyNode> {
    let mut tree: BTreeMap<&str, BTreeMap<&str, BTreeMap<&str, f64>>> = BTreeMap::new();
    for record in dataset {
        *tree
            .entry(record.region.as_str())
            .or_default()
            .entry(record.category.as_str())
            .or_default()
            .entry(record.sub_category.as_str())
            .or_insert(0.0) += record.sales;
    }

    tree.into_iter()
        .map(|(region, categories)| {
            let children: Vec<HierarchyNode> = categories
                .into_iter()
                .map(|(category, subs)| {
                    let children: Vec<HierarchyNode> = subs
                        .into_iter()
                        .map(|(sub, sales)| HierarchyNode {
                            name: sub.to_string(),
                            sales,
                            children: Vec::new(),
                        })
                        .collect();
                    node(category, children)
                })
                .collect();
            node(region, children)
        })
        .collect()
}

fn node(name: &str, children: Vec<HierarchyNode>) -> HierarchyNode {
    HierarchyNode {
        name: name.to_string(),
        sales: children.iter().map(|c| c.sales).sum(),
        children,
    }
}

/// Mean Sales per (Sub-Category, month name), across all years
pub fn sub_category_month_pivot(dataset: &Dataset) -> Pivot {
    let mut cells: BTreeMap<&str, BTreeMap<u32, (f64, usize)>> = BTreeMap::new();
    let mut months_seen = [false; 12];

    for record in dataset {
        let month = record.order_date.month();
        months_seen[(month - 1) as usize] = true;
        let cell = cells
            .entry(record.sub_category.as_str())
            .or_default()
            .entry(month)
            .or_insert((0.0, 0));
        cell.0 += record.sales;
        cell.1 += 1;
    }

    let months: Vec<u32> = (1..=12).filter(|m| months_seen[(m - 1) as usize]).collect();
    let rows = cells
        .into_iter()
        .map(|(sub_category, by_month)| PivotRow {
            sub_category: sub_category.to_string(),
            values: months
                .iter()
                .map(|m| by_month.get(m).map(|(sum, n)| sum / *n as f64))
                .collect(),
        })
        .collect();

    Pivot {
        months: months.iter().map(|&m| month_name(m)).collect(),
        rows,
    }
}

fn month_name(month: u32) -> String {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name().to_string())
        .unwrap_or_default()
}

pub fn scatter_points(dataset: &Dataset) -> Vec<ScatterPoint> {
    dataset
        .iter()
        .map(|r| ScatterPoint {
            sales: r.sales,
            profit: r.profit,
            quantity: r.quantity,
        })
        .collect()
}

/// First `n` rows projected to the summary columns
pub fn sample_rows(dataset: &Dataset, n: usize) -> Vec<SampleRow> {
    dataset
        .iter()
        .take(n)
        .map(|r| SampleRow {
            region: r.region.clone(),
            state: r.state.clone(),
            city: r.city.clone(),
            category: r.category.clone(),
            sales: r.sales,
            profit: r.profit,
            quantity: r.quantity,
        })
        .collect()
}

pub fn summary(dataset: &Dataset) -> Summary {
    dataset.iter().fold(
        Summary {
            orders: dataset.len(),
            ..Summary::default()
        },
        |mut acc, r| {
            acc.sales += r.sales;
            acc.profit += r.profit;
            acc.quantity += r.quantity;
            acc
        },
    )
}

/// `1234.567` → `"$1,234.57"`, `-5.0` → `"-$5.00"`
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Two-column `<key>,Sales` table as exported by the download buttons
pub fn group_table(key_header: &str, totals: &[GroupTotal]) -> Table {
    Table {
        headers: vec![key_header.to_string(), SALES.to_string()],
        rows: totals
            .iter()
            .map(|t| vec![t.key.clone(), t.sales.to_string()])
            .collect(),
    }
}

pub fn monthly_table(totals: &[MonthTotal]) -> Table {
    Table {
        headers: vec!["month_year".to_string(), SALES.to_string()],
        rows: totals
            .iter()
            .map(|t| vec![t.month_year.clone(), t.sales.to_string()])
            .collect(),
    }
}

pub fn pivot_table(pivot: &Pivot) -> Table {
    let mut headers = vec!["Sub-Category".to_string()];
    headers.extend(pivot.months.iter().cloned());
    Table {
        headers,
        rows: pivot
            .rows
            .iter()
            .map(|row| {
                let mut cells = vec![row.sub_category.clone()];
                cells.extend(
                    row.values
                        .iter()
                        .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
                );
                cells
            })
            .collect(),
    }
}

pub fn sample_table(rows: &[SampleRow]) -> Table {
    Table {
        headers: [REGION, STATE, CITY, CATEGORY, SALES, PROFIT, QUANTITY]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    r.region.clone(),
                    r.state.clone(),
                    r.city.clone(),
                    r.category.clone(),
                    r.sales.to_string(),
                    r.profit.to_string(),
                    r.quantity.to_string(),
                ]
            })
            .collect(),
    }
}
