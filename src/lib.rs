/*!
# Salesboard

A browser-based sales dashboard over a Superstore-style order table, built in Rust.

## Overview

An order file (CSV, text or Excel) is loaded into memory and explored through a
date window plus three location selectors: Region, State and City. Every change
recomputes the filtered view, the charts and the downloadable tables on the server.

## Architecture

### Frontend Layer
- **Technologies**: HTML, CSS, JavaScript
- **Key Components**:
  - Filter sidebar with a date window and three multi-selects
  - Chart panels rendered as SVG by the server
  - Summary, pivot and raw data tables with CSV/XLSX downloads

### Backend Layer
- **Technologies**: Rust, axum
- **Core Components**:
  - Loader - Reads CSV, TXT, XLSX and XLS files into a typed dataset
  - Filter Resolver - Pure conjunction of the non-empty selections
  - Candidate Cascade - Region, State and City options narrowed from left to right
  - Aggregation - Group-by sums, monthly series, hierarchy and pivot tables
  - Graph Generator - Bar, pie, line, scatter and treemap charts via plotters
  - Session Store - Per-browser dataset and filter choices behind a cookie

## Key Features

- An empty selection never filters; non-empty selections are ANDed
- Selections that no longer match any candidate are kept, not cleared
- Inclusive date pre-filter defaulting to the dataset's own span
- Upload replaces the session's dataset and resets its choices
- Category, Region, TimeSeries and Data downloads as CSV, Data also as XLSX

## Modules

- **record**: Record and Dataset types, column names
- **filter**: Selections, the resolver, candidate lists and date windows
- **loader**: File ingestion and column validation
- **aggregate**: Sums, series, pivots and printable tables
- **downloader**: Export functionality (CSV, XLSX)
- **graph**: Chart generation from the current view
- **session**: Per-session state and the recomputed dashboard view
- **config**: Defaults, environment and command-line settings
- **app**: Routing and handlers

## REST API Endpoints

- `GET /` - Dashboard page
- `GET /api/dashboard` - Current view as JSON
- `POST /api/filters` - Replace the date window and selections
- `POST /api/upload` - Load a new dataset for this session
- `GET /api/chart/{name}` - One chart as SVG
- `GET /api/download/{name}` - Category, Region, TimeSeries or Data as CSV
- `GET /api/export/xlsx` - Date-filtered data as an Excel workbook
*/

pub mod aggregate;
pub mod config;
pub mod downloader;
pub mod filter;
pub mod loader;
pub mod record;
pub mod session;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod graph;

/// Re-export the types most callers need
pub use filter::{Candidates, DateRange, FilterState, Selection, filter_by_dates, resolve};
pub use loader::{IngestionError, load_dataset};
pub use record::{Dataset, Record};
pub use session::{DashboardView, Session, ViewLimits};
