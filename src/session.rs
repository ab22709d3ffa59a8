//! Per-session dashboard state and the view recomputed from it on every request.

use serde::Serialize;
use std::sync::Arc;

use crate::aggregate::{
    self, GroupTotal, HierarchyNode, MonthTotal, Pivot, SampleRow, ScatterPoint, Summary,
};
use crate::filter::{Candidates, DateRange, FilterState};
use crate::record::{Dataset, Record};

/// Row limits for the tables shown alongside the charts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewLimits {
    /// Rows of the resolved data shown in "View Data"
    pub view_rows: usize,
    /// Rows of the date-filtered data in the summary sample table
    pub sample_rows: usize,
}

impl Default for ViewLimits {
    fn default() -> Self {
        ViewLimits {
            view_rows: 500,
            sample_rows: 5,
        }
    }
}

/// What one user is looking at: a loaded dataset and their current choices
#[derive(Clone, Debug)]
pub struct Session {
    dataset: Arc<Dataset>,
    source: String,
    dates: Option<DateRange>,
    filters: FilterState,
}

impl Session {
    pub fn new(dataset: Arc<Dataset>, source: impl Into<String>) -> Self {
        Session {
            dataset,
            source: source.into(),
            dates: None,
            filters: FilterState::default(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Swaps in a newly uploaded dataset; earlier choices no longer apply
    pub fn replace_dataset(&mut self, dataset: Dataset, source: impl Into<String>) {
        self.dataset = Arc::new(dataset);
        self.source = source.into();
        self.dates = None;
        self.filters = FilterState::default();
    }

    /// Stores the user's choices as given. `None` keeps the full date span.
    pub fn set_filters(&mut self, dates: Option<DateRange>, filters: FilterState) {
        self.dates = dates;
        self.filters = filters;
    }

    /// The chosen window, or the dataset's own span when none was chosen
    pub fn date_range(&self) -> Option<DateRange> {
        self.dates.or_else(|| DateRange::spanning(&self.dataset))
    }

    /// Recomputes everything the dashboard shows from the current choices
    pub fn view(&self, limits: ViewLimits) -> DashboardView {
        let date_range = self.date_range();
        let date_filtered = match date_range {
            Some(range) => range.apply(&self.dataset),
            None => (*self.dataset).clone(),
        };
        let candidates = self.filters.candidates(&date_filtered);
        let resolved = self.filters.apply(&date_filtered);

        DashboardView {
            source: self.source.clone(),
            date_bounds: DateRange::spanning(&self.dataset),
            date_range,
            filters: self.filters.clone(),
            candidates,
            summary: aggregate::summary(&resolved),
            sales_by_category: aggregate::sales_by_category(&resolved),
            sales_by_region: aggregate::sales_by_region(&resolved),
            sales_by_segment: aggregate::sales_by_segment(&resolved),
            monthly_sales: aggregate::monthly_sales(&resolved),
            hierarchy: aggregate::sales_hierarchy(&resolved),
            pivot: aggregate::sub_category_month_pivot(&resolved),
            scatter: aggregate::scatter_points(&resolved),
            sample: aggregate::sample_rows(&date_filtered, limits.sample_rows),
            rows: resolved.records.iter().take(limits.view_rows).cloned().collect(),
            date_filtered,
            resolved,
        }
    }
}

/// Everything derived from one session for one request
#[derive(Clone, Debug, Serialize)]
pub struct DashboardView {
    pub source: String,
    /// Earliest and latest order date of the whole dataset
    pub date_bounds: Option<DateRange>,
    pub date_range: Option<DateRange>,
    pub filters: FilterState,
    pub candidates: Candidates,
    pub summary: Summary,
    pub sales_by_category: Vec<GroupTotal>,
    pub sales_by_region: Vec<GroupTotal>,
    pub sales_by_segment: Vec<GroupTotal>,
    pub monthly_sales: Vec<MonthTotal>,
    pub hierarchy: Vec<HierarchyNode>,
    pub pivot: Pivot,
    pub scatter: Vec<ScatterPoint>,
    pub sample: Vec<SampleRow>,
    pub rows: Vec<Record>,
    #[serde(skip)]
    pub date_filtered: Dataset,
    #[serde(skip)]
    pub resolved: Dataset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Selection;
    use crate::loader::from_csv_reader;
    use chrono::NaiveDate;

    const SAMPLE: &str = include_str!("../data/sample_superstore.csv");

    fn session() -> Session {
        let dataset = from_csv_reader(SAMPLE.as_bytes()).unwrap();
        Session::new(Arc::new(dataset), "sample_superstore.csv")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_view_covers_everything() {
        let view = session().view(ViewLimits::default());
        let range = view.date_range.unwrap();
        assert_eq!(range.start, date(2014, 5, 13));
        assert_eq!(range.end, date(2017, 10, 19));
        assert_eq!(view.date_bounds, view.date_range);
        assert_eq!(view.summary.orders, 20);
        assert_eq!(view.resolved.len(), 20);
        assert_eq!(view.candidates.regions, vec!["South", "West", "Central", "East"]);
        assert_eq!(view.sample.len(), 5);
        assert_eq!(view.rows.len(), 20);
    }

    #[test]
    fn test_filters_narrow_the_view_but_not_the_sample() {
        let mut s = session();
        let west: Selection = ["West"].into_iter().collect();
        let california: Selection = ["California"].into_iter().collect();
        s.set_filters(None, FilterState::new(west, california, Selection::new()));

        let view = s.view(ViewLimits::default());
        assert_eq!(view.candidates.states, vec!["California", "Washington", "Utah"]);
        assert_eq!(
            view.candidates.cities,
            vec!["Los Angeles", "San Francisco"]
        );
        assert_eq!(view.summary.orders, 5);
        assert!(view.resolved.iter().all(|r| r.state == "California"));
        assert_eq!(view.sales_by_region.len(), 1);
        // the sample table reads the date-filtered data, not the resolved rows
        assert_eq!(view.sample[0].city, "Henderson");
    }

    #[test]
    fn test_date_window_applies_before_candidates() {
        let mut s = session();
        let window = DateRange::new(date(2017, 1, 1), date(2017, 12, 31)).unwrap();
        s.set_filters(Some(window), FilterState::default());

        let view = s.view(ViewLimits::default());
        assert_eq!(view.summary.orders, 3);
        assert_eq!(view.candidates.regions, vec!["South", "East", "Central"]);
        assert_eq!(view.date_bounds.unwrap().start, date(2014, 5, 13));
    }

    #[test]
    fn test_stale_city_gives_empty_view() {
        let mut s = session();
        let east: Selection = ["East"].into_iter().collect();
        let henderson: Selection = ["Henderson"].into_iter().collect();
        s.set_filters(None, FilterState::new(east, Selection::new(), henderson));

        let view = s.view(ViewLimits::default());
        assert_eq!(view.summary.orders, 0);
        assert!(view.sales_by_category.is_empty());
        assert!(view.monthly_sales.is_empty());
        assert!(!view.candidates.cities.contains(&"Henderson".to_string()));
        assert!(view.filters.city.contains("Henderson"));
    }

    #[test]
    fn test_replace_dataset_resets_choices() {
        let mut s = session();
        let south: Selection = ["South"].into_iter().collect();
        s.set_filters(None, FilterState::new(south, Selection::new(), Selection::new()));
        s.replace_dataset(Dataset::default(), "empty.csv");

        assert_eq!(s.source(), "empty.csv");
        assert!(s.filters().is_empty());
        let view = s.view(ViewLimits::default());
        assert!(view.date_range.is_none());
        assert_eq!(view.summary, Summary::default());
    }

    #[test]
    fn test_view_limits_cap_tables() {
        let limits = ViewLimits {
            view_rows: 3,
            sample_rows: 1,
        };
        let view = session().view(limits);
        assert_eq!(view.rows.len(), 3);
        assert_eq!(view.sample.len(), 1);
    }
}
