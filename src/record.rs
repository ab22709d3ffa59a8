use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Column holding the order date
pub const ORDER_DATE: &str = "Order Date";
pub const REGION: &str = "Region";
pub const STATE: &str = "State";
pub const CITY: &str = "City";
pub const CATEGORY: &str = "Category";
pub const SUB_CATEGORY: &str = "Sub-Category";
pub const SEGMENT: &str = "Segment";
pub const SALES: &str = "Sales";
pub const PROFIT: &str = "Profit";
pub const QUANTITY: &str = "Quantity";

/// Columns a source file must carry for the filters to work
pub const REQUIRED_COLUMNS: [&str; 4] = [ORDER_DATE, REGION, STATE, CITY];

/// Date format used when a record is written back out
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One row of the sales dataset
///
/// The columns the dashboard reads are typed fields. Every other column of the
/// source file is kept verbatim in `extra`, keyed by its header, so nothing is
/// lost on export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub order_date: NaiveDate,
    pub region: String,
    pub state: String,
    pub city: String,
    pub category: String,
    pub sub_category: String,
    pub segment: String,
    pub sales: f64,
    pub profit: f64,
    pub quantity: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Record {
    /// Creates a record with the location and date set and every measure zeroed
    pub fn new(order_date: NaiveDate, region: &str, state: &str, city: &str) -> Self {
        Record {
            order_date,
            region: region.to_string(),
            state: state.to_string(),
            city: city.to_string(),
            category: String::new(),
            sub_category: String::new(),
            segment: String::new(),
            sales: 0.0,
            profit: 0.0,
            quantity: 0,
            extra: BTreeMap::new(),
        }
    }

    /// Text value of a column by its header name
    ///
    /// Unknown columns fall through to the passthrough bag and come back empty
    /// when absent there too.
    pub fn field(&self, column: &str) -> Cow<'_, str> {
        match column {
            ORDER_DATE => Cow::Owned(self.order_date.format(DATE_FORMAT).to_string()),
            REGION => Cow::Borrowed(&self.region),
            STATE => Cow::Borrowed(&self.state),
            CITY => Cow::Borrowed(&self.city),
            CATEGORY => Cow::Borrowed(&self.category),
            SUB_CATEGORY => Cow::Borrowed(&self.sub_category),
            SEGMENT => Cow::Borrowed(&self.segment),
            SALES => Cow::Owned(self.sales.to_string()),
            PROFIT => Cow::Owned(self.profit.to_string()),
            QUANTITY => Cow::Owned(self.quantity.to_string()),
            other => self
                .extra
                .get(other)
                .map(|v| Cow::Borrowed(v.as_str()))
                .unwrap_or(Cow::Borrowed("")),
        }
    }
}

/// Ordered collection of records plus the column order of the source file
///
/// Datasets are never mutated once loaded; every filter hands back a new one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Dataset { columns, records }
    }

    /// Builds a dataset with the standard column layout
    pub fn from_records(records: Vec<Record>) -> Self {
        let columns = [
            ORDER_DATE,
            REGION,
            STATE,
            CITY,
            SEGMENT,
            CATEGORY,
            SUB_CATEGORY,
            SALES,
            QUANTITY,
            PROFIT,
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        Dataset { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Keeps the records matching `predicate`, in their original order
    pub fn filter<F>(&self, predicate: F) -> Dataset
    where
        F: Fn(&Record) -> bool,
    {
        Dataset {
            columns: self.columns.clone(),
            records: self
                .records
                .iter()
                .filter(|r| predicate(r))
                .cloned()
                .collect(),
        }
    }

    /// Earliest and latest order date, `None` for an empty dataset
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.records.iter().map(|r| r.order_date).min()?;
        let max = self.records.iter().map(|r| r.order_date).max()?;
        Some((min, max))
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
