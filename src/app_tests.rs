use super::*;
use axum::body::{Body, to_bytes};
use axum::http::{Request, header::HeaderValue};
use serde_json::Value;
use tower::ServiceExt;

use crate::loader::from_csv_reader;

const SAMPLE: &str = include_str!("../data/sample_superstore.csv");

fn state_with(config: &Config) -> Arc<AppState> {
    let dataset = from_csv_reader(SAMPLE.as_bytes()).unwrap();
    Arc::new(AppState::new(dataset, "sample_superstore.csv", config).unwrap())
}

fn app() -> Router {
    router(state_with(&Config::default()))
}

/// `name=value` pair from a response's Set-Cookie header
fn session_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_dashboard_opens_a_session() {
    let response = app().oneshot(get("/api/dashboard", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).starts_with("salesboard_session="));

    let view = body_json(response).await;
    assert_eq!(view["summary"]["orders"], 20);
    assert_eq!(view["date_range"]["start"], "2014-05-13");
    assert_eq!(view["date_range"]["end"], "2017-10-19");
    assert_eq!(view["candidates"]["regions"][0], "South");
    assert_eq!(view["filters"]["region"], serde_json::json!([]));
}

#[tokio::test]
async fn test_page_renders_title_and_source() {
    let response = app().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Demo Store Sales Data Analysis"));
    assert!(page.contains("sample_superstore.csv"));
}

#[tokio::test]
async fn test_filters_persist_across_requests() {
    let app = app();
    let first = app.clone().oneshot(get("/api/dashboard", None)).await.unwrap();
    let cookie = session_cookie(&first);

    let update = serde_json::json!({
        "region": ["West"],
        "state": ["California"],
    });
    let response = app
        .clone()
        .oneshot(post_json("/api/filters", Some(&cookie), update))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // a known cookie is not reissued
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let view = body_json(response).await;
    assert_eq!(view["summary"]["orders"], 5);
    assert_eq!(
        view["candidates"]["cities"],
        serde_json::json!(["Los Angeles", "San Francisco"])
    );

    let response = app
        .clone()
        .oneshot(get("/api/download/region", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION),
        Some(&HeaderValue::from_static("attachment; filename=\"Region.csv\""))
    );
    let csv = body_text(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "Region,Sales");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("West,"));

    // a different visitor still sees everything
    let other = app.oneshot(get("/api/dashboard", None)).await.unwrap();
    assert_eq!(body_json(other).await["summary"]["orders"], 20);
}

#[tokio::test]
async fn test_reversed_dates_are_rejected() {
    let update = serde_json::json!({
        "start_date": "2017-01-01",
        "end_date": "2016-01-01",
    });
    let response = app()
        .oneshot(post_json("/api/filters", None, update))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_open_ended_window_uses_dataset_bound() {
    let update = serde_json::json!({ "start_date": "2017-01-01" });
    let response = app()
        .oneshot(post_json("/api/filters", None, update))
        .await
        .unwrap();
    let view = body_json(response).await;
    assert_eq!(view["date_range"]["end"], "2017-10-19");
    assert_eq!(view["summary"]["orders"], 3);
}

#[tokio::test]
async fn test_data_download_ignores_location_filters() {
    let app = app();
    let update = serde_json::json!({ "region": ["East"] });
    let response = app
        .clone()
        .oneshot(post_json("/api/filters", None, update))
        .await
        .unwrap();
    let cookie = session_cookie(&response);

    let response = app
        .oneshot(get("/api/download/data", Some(&cookie)))
        .await
        .unwrap();
    let csv = body_text(response).await;
    // header plus every row in the date window
    assert_eq!(csv.lines().count(), 21);
}

fn upload(file_name: &str, contents: &str) -> Request<Body> {
    let boundary = "salesboard-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
         Content-Type: text/csv\r\n\r\n{contents}\r\n--{b}--\r\n",
        b = boundary,
        name = file_name,
        contents = contents
    );
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Roughly `rows * 50` bytes of valid orders
fn large_csv(rows: usize) -> String {
    let mut csv = String::from("Order Date,Region,State,City,Sales\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "2018-01-{:02},West,Oregon,Portland Heights District,{}.25\n",
            i % 28 + 1,
            i % 500
        ));
    }
    csv
}

#[tokio::test]
async fn test_upload_replaces_the_session_dataset() {
    let csv = "Order Date,Region,State,City,Sales\n\
               2018-01-02,West,Oregon,Portland,10.5\n\
               2018-02-03,East,Ohio,Columbus,4.5\n";
    let response = app().oneshot(upload("tiny.csv", csv)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["source"], "tiny.csv");
    assert_eq!(view["summary"]["orders"], 2);
    assert_eq!(view["candidates"]["regions"], serde_json::json!(["West", "East"]));
}

#[tokio::test]
async fn test_upload_with_wrong_extension_is_refused() {
    let response = app().oneshot(upload("notes.pdf", "hello")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_upload_larger_than_two_megabytes() {
    let csv = large_csv(70_000);
    assert!(csv.len() > 3 * 1024 * 1024);

    let response = app().oneshot(upload("big.csv", &csv)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["summary"]["orders"], 70_000);
    assert_eq!(view["rows"].as_array().unwrap().len(), 500);
}

#[tokio::test]
async fn test_upload_over_the_configured_limit() {
    let config = Config {
        upload_limit: 64 * 1024,
        ..Config::default()
    };
    let response = router(state_with(&config))
        .oneshot(upload("big.csv", &large_csv(5_000)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn test_known_cookie_reuses_its_session() {
    let state = state_with(&Config::default());
    let app = router(state.clone());

    let first = app.clone().oneshot(get("/api/dashboard", None)).await.unwrap();
    let cookie = session_cookie(&first);
    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(get("/api/dashboard", Some(&cookie)))
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
    app.clone().oneshot(get("/api/dashboard", None)).await.unwrap();
    app.oneshot(get("/api/dashboard", Some("salesboard_session=forged")))
        .await
        .unwrap();

    assert_eq!(state.session_count().unwrap(), 3);
}

#[tokio::test]
async fn test_idle_sessions_are_dropped() {
    let config = Config {
        session_ttl_secs: 0,
        ..Config::default()
    };
    let state = state_with(&config);
    let app = router(state.clone());

    let first = app.clone().oneshot(get("/api/dashboard", None)).await.unwrap();
    let cookie = session_cookie(&first);
    for _ in 0..200 {
        app.clone().oneshot(get("/api/dashboard", None)).await.unwrap();
    }
    assert_eq!(state.session_count().unwrap(), 1);

    // an expired cookie gets a fresh session
    let response = app
        .oneshot(get("/api/dashboard", Some(&cookie)))
        .await
        .unwrap();
    assert_ne!(session_cookie(&response), cookie);
    assert_eq!(state.session_count().unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_chart_and_download_are_not_found() {
    let app = app();
    let chart = app
        .clone()
        .oneshot(get("/api/chart/histogram", None))
        .await
        .unwrap();
    assert_eq!(chart.status(), StatusCode::NOT_FOUND);

    let download = app.oneshot(get("/api/download/pivot", None)).await.unwrap();
    assert_eq!(download.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_xlsx_export() {
    let response = app().oneshot(get("/api/export/xlsx", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"PK"));
}
