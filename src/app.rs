use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::config::Config;
use crate::downloader::{self, Download, ExportError};
use crate::filter::{DateRange, FilterState, InvalidDateRange, Selection};
use crate::graph::Chart;
use crate::loader::{self, IngestionError};
use crate::record::Dataset;
use crate::session::{DashboardView, Session, ViewLimits};

pub const SESSION_COOKIE: &str = "salesboard_session";

const PAGE_TITLE: &str = "Demo Store Sales Data Analysis";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Upload(#[from] MultipartError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    InvalidDates(#[from] InvalidDateRange),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidDates(_) => StatusCode::BAD_REQUEST,
            AppError::Upload(e) => e.status(),
            AppError::Ingestion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Export(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("rejected request: {}", self);
        }
        (
            status,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(self.to_string()),
            }),
        )
            .into_response()
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("session store lock poisoned".to_string())
}

struct SessionEntry {
    session: Session,
    /// Milliseconds since the server started
    last_seen: AtomicU64,
}

/// Shared server state: the default dataset and every open session
pub struct AppState {
    limits: ViewLimits,
    upload_limit: usize,
    session_ttl: Duration,
    started: Instant,
    default_dataset: Arc<Dataset>,
    default_source: String,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    templates: Handlebars<'static>,
}

impl AppState {
    pub fn new(
        default_dataset: Dataset,
        default_source: impl Into<String>,
        config: &Config,
    ) -> Result<Self, AppError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        templates
            .register_template_string("dashboard", include_str!("./static/dashboard.hbs"))
            .map_err(|e| AppError::Internal(e.to_string()))?;

        Ok(AppState {
            limits: config.limits(),
            upload_limit: config.upload_limit,
            session_ttl: config.session_ttl(),
            started: Instant::now(),
            default_dataset: Arc::new(default_dataset),
            default_source: default_source.into(),
            sessions: RwLock::new(HashMap::new()),
            templates,
        })
    }

    pub fn session_count(&self) -> Result<usize, AppError> {
        Ok(self.sessions.read().map_err(poisoned)?.len())
    }

    fn now(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn is_live(&self, entry: &SessionEntry, now: u64) -> bool {
        let idle = now.saturating_sub(entry.last_seen.load(Ordering::Relaxed));
        u128::from(idle) < self.session_ttl.as_millis()
    }

    /// Copy of the caller's session, opening a new one when the cookie is
    /// missing, unknown or expired
    fn session(&self, jar: CookieJar) -> Result<(CookieJar, Session), AppError> {
        if let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
            let sessions = self.sessions.read().map_err(poisoned)?;
            let now = self.now();
            if let Some(entry) = sessions.get(&id).filter(|e| self.is_live(e, now)) {
                entry.last_seen.store(now, Ordering::Relaxed);
                return Ok((jar, entry.session.clone()));
            }
        }
        self.update_session(jar, |_| Ok(()))
    }

    /// Applies `change` to the caller's session and returns the result.
    /// Idle sessions are dropped here, before any new one is opened.
    fn update_session<F>(&self, jar: CookieJar, change: F) -> Result<(CookieJar, Session), AppError>
    where
        F: FnOnce(&mut Session) -> Result<(), AppError>,
    {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let now = self.now();

        let before = sessions.len();
        sessions.retain(|_, entry| self.is_live(entry, now));
        if sessions.len() < before {
            log::info!("expired {} idle sessions", before - sessions.len());
        }

        let known = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|id| sessions.contains_key(id));
        let (jar, id) = match known {
            Some(id) => (jar, id),
            None => {
                let id = Uuid::new_v4().to_string();
                let session =
                    Session::new(self.default_dataset.clone(), self.default_source.clone());
                sessions.insert(
                    id.clone(),
                    SessionEntry {
                        session,
                        last_seen: AtomicU64::new(now),
                    },
                );
                log::info!("opened session {}", id);
                let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
                    .path("/")
                    .http_only(true)
                    .build();
                (jar.add(cookie), id)
            }
        };

        let entry = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal(format!("session {} vanished", id)))?;
        *entry.last_seen.get_mut() = now;
        change(&mut entry.session)?;
        Ok((jar, entry.session.clone()))
    }
}

/// Filter choices posted by the page
#[derive(Debug, Default, Deserialize)]
pub struct FilterUpdate {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub region: Selection,
    #[serde(default)]
    pub state: Selection,
    #[serde(default)]
    pub city: Selection,
}

impl FilterUpdate {
    /// The requested window; a missing end falls back to the dataset's own bound
    fn date_range(&self, dataset: &Dataset) -> Result<Option<DateRange>, InvalidDateRange> {
        if self.start_date.is_none() && self.end_date.is_none() {
            return Ok(None);
        }
        let bounds = dataset.date_bounds();
        let start = self.start_date.or(bounds.map(|(min, _)| min));
        let end = self.end_date.or(bounds.map(|(_, max)| max));
        match (start, end) {
            (Some(start), Some(end)) => DateRange::new(start, end).map(Some),
            _ => Ok(None),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = state.upload_limit;
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/filters", post(update_filters))
        .route("/api/upload", post(upload_dataset))
        .route("/api/chart/:name", get(get_chart))
        .route("/api/download/:name", get(download_table))
        .route("/api/export/xlsx", get(export_xlsx))
        .nest_service("/static", ServeDir::new("static"))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let source = config.data.display().to_string();
    let dataset = match loader::load_dataset(&config.data) {
        Ok(dataset) => dataset,
        Err(e) => {
            log::warn!("default dataset {} unavailable ({}); starting empty", source, e);
            Dataset::default()
        }
    };

    let state = Arc::new(AppState::new(dataset, source, &config)?);
    let app = router(state);

    let listener = TcpListener::bind(config.addr()).await?;
    log::info!("Listening on http://{}", config.addr());
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), AppError> {
    let (jar, session) = state.session(jar)?;
    let page = state
        .templates
        .render(
            "dashboard",
            &json!({ "title": PAGE_TITLE, "source": session.source() }),
        )
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((jar, Html(page)))
}

async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<DashboardView>), AppError> {
    let (jar, session) = state.session(jar)?;
    Ok((jar, Json(session.view(state.limits))))
}

async fn update_filters(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(update): Json<FilterUpdate>,
) -> Result<(CookieJar, Json<DashboardView>), AppError> {
    let (jar, session) = state.update_session(jar, |session| {
        let dates = update.date_range(session.dataset())?;
        let filters = FilterState::new(update.region, update.state, update.city);
        session.set_filters(dates, filters);
        Ok(())
    })?;
    Ok((jar, Json(session.view(state.limits))))
}

async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<(CookieJar, Json<DashboardView>), AppError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field.bytes().await?;
            upload = Some((file_name, bytes.to_vec()));
        }
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("No file data received".to_string()))?;
    let dataset = loader::load_bytes(&file_name, bytes)?;

    let (jar, session) = state.update_session(jar, |session| {
        session.replace_dataset(dataset, file_name);
        Ok(())
    })?;
    Ok((jar, Json(session.view(state.limits))))
}

async fn get_chart(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let chart = Chart::from_name(&name).ok_or_else(|| AppError::NotFound(name.clone()))?;
    let (jar, session) = state.session(jar)?;
    let svg = chart
        .render(&session.view(state.limits))
        .map_err(|e| AppError::Internal(format!("chart {} failed: {}", chart.name(), e)))?;
    Ok((jar, [(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

async fn download_table(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let download = Download::from_name(&name).ok_or_else(|| AppError::NotFound(name.clone()))?;
    let (jar, session) = state.session(jar)?;
    let csv = downloader::render_download(&session.view(state.limits), download)?;
    Ok((
        jar,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.file_name()),
            ),
        ],
        csv,
    )
        .into_response())
}

async fn export_xlsx(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let (jar, session) = state.session(jar)?;
    let view = session.view(state.limits);
    let bytes = downloader::dataset_to_xlsx(&view.date_filtered)?;
    Ok((
        jar,
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"Data.xlsx\""),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
