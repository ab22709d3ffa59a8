//! Cascading Region / State / City filters and the date-range pre-filter.
//!
//! Every function here is pure: it takes a dataset and selections and hands back
//! a new dataset. Nothing remembers earlier calls, so the same inputs always give
//! the same rows in the same order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::record::{Dataset, Record};

/// Values picked for one dimension
///
/// An empty selection means the dimension is unconstrained.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(BTreeSet<String>);

impl Selection {
    pub fn new() -> Self {
        Selection(BTreeSet::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn insert(&mut self, value: impl Into<String>) -> bool {
        self.0.insert(value.into())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.contains(value)
    }

    /// True when the selection is empty or holds `value`
    pub fn admits(&self, value: &str) -> bool {
        self.is_empty() || self.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Parses a comma-separated list, ignoring blanks
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Selection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Selection(iter.into_iter().map(Into::into).collect())
    }
}

/// The three categorical selections of one session
///
/// Selections are never cleared implicitly: a City left over after the Region
/// changes still filters by that city.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    #[serde(default)]
    pub region: Selection,
    #[serde(default)]
    pub state: Selection,
    #[serde(default)]
    pub city: Selection,
}

impl FilterState {
    pub fn new(region: Selection, state: Selection, city: Selection) -> Self {
        FilterState {
            region,
            state,
            city,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty() && self.state.is_empty() && self.city.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.region.admits(&record.region)
            && self.state.admits(&record.state)
            && self.city.admits(&record.city)
    }

    pub fn apply(&self, dataset: &Dataset) -> Dataset {
        resolve(dataset, &self.region, &self.state, &self.city)
    }

    /// Values offered to each selector under these selections
    pub fn candidates(&self, dataset: &Dataset) -> Candidates {
        let by_region = narrow_by_region(dataset, &self.region);
        let by_state = narrow_by_state(&by_region, &self.state);
        Candidates {
            regions: candidate_regions(dataset),
            states: candidate_states(&by_region),
            cities: candidate_cities(&by_state),
        }
    }
}

/// Choices for the Region, State and City selectors, in first-seen order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Candidates {
    pub regions: Vec<String>,
    pub states: Vec<String>,
    pub cities: Vec<String>,
}

pub fn narrow_by_region(dataset: &Dataset, selection: &Selection) -> Dataset {
    if selection.is_empty() {
        return dataset.clone();
    }
    dataset.filter(|r| selection.contains(&r.region))
}

/// Narrows a Region-narrowed dataset by State
pub fn narrow_by_state(dataset: &Dataset, selection: &Selection) -> Dataset {
    if selection.is_empty() {
        return dataset.clone();
    }
    dataset.filter(|r| selection.contains(&r.state))
}

pub fn narrow_by_city(dataset: &Dataset, selection: &Selection) -> Dataset {
    if selection.is_empty() {
        return dataset.clone();
    }
    dataset.filter(|r| selection.contains(&r.city))
}

pub fn candidate_regions(dataset: &Dataset) -> Vec<String> {
    distinct(dataset, |r| &r.region)
}

pub fn candidate_states(region_narrowed: &Dataset) -> Vec<String> {
    distinct(region_narrowed, |r| &r.state)
}

pub fn candidate_cities(state_narrowed: &Dataset) -> Vec<String> {
    distinct(state_narrowed, |r| &r.city)
}

fn distinct<F>(dataset: &Dataset, key: F) -> Vec<String>
where
    F: Fn(&Record) -> &String,
{
    let mut seen = HashSet::new();
    dataset
        .iter()
        .map(key)
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

/// Rows matching every non-empty selection
///
/// An empty selection adds no constraint, so all three empty returns the
/// dataset unchanged. Each non-empty selection is a bare membership test on its
/// own field, independent of the others.
pub fn resolve(
    dataset: &Dataset,
    region: &Selection,
    state: &Selection,
    city: &Selection,
) -> Dataset {
    let resolved = if region.is_empty() && state.is_empty() && city.is_empty() {
        dataset.clone()
    } else {
        dataset.filter(|r| {
            region.admits(&r.region) && state.admits(&r.state) && city.admits(&r.city)
        })
    };
    log::debug!(
        "resolved {} of {} rows (regions={}, states={}, cities={})",
        resolved.len(),
        dataset.len(),
        region.len(),
        state.len(),
        city.len()
    );
    resolved
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("start date {start} is after end date {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive order-date window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if start > end {
            return Err(InvalidDateRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    /// The window from the earliest to the latest order date of `dataset`
    pub fn spanning(dataset: &Dataset) -> Option<Self> {
        dataset
            .date_bounds()
            .map(|(start, end)| DateRange { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn apply(&self, dataset: &Dataset) -> Dataset {
        filter_by_dates(dataset, self.start, self.end)
    }
}

/// Records with `start <= order_date <= end`
///
/// The bounds are not validated here; a reversed window matches nothing.
pub fn filter_by_dates(dataset: &Dataset, start: NaiveDate, end: NaiveDate) -> Dataset {
    dataset.filter(|r| start <= r.order_date && r.order_date <= end)
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
