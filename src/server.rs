use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    scanner::Scanner,
    state::ScanState,
    types::{Progress, ScanConfig, ScanPhase, ScanReport},
};

#[derive(Clone, Default)]
pub struct AppState {
    inner: Arc<RwLock<ServerState>>, // shared mutable state for progress/results
}

#[derive(Debug, Default)]
struct ServerState {
    /// Bumped per accepted scan so a superseded run cannot overwrite newer results.
    generation: u64,
    progress: Option<Arc<ScanState>>,
    cancel: Option<CancellationToken>,
    results: Option<ScanReport>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Status {
    pub phase: ScanPhase,
    #[serde(flatten)]
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerState {
    fn status(&self) -> Status {
        match (&self.progress, &self.results) {
            (Some(p), _) => Status { phase: p.phase(), progress: p.progress(), error: None },
            (None, Some(r)) => Status {
                phase: ScanPhase::Reported,
                progress: Progress {
                    total: r.total_ports as u64,
                    scanned: r.results.len() as u64,
                    open: r.open_count() as u64,
                },
                error: None,
            },
            (None, None) => match &self.last_error {
                Some(e) => Status { phase: ScanPhase::Failed, error: Some(e.clone()), ..Status::default() },
                None => Status::default(),
            },
        }
    }
}

/// Build the API router: `/api/scan`, `/api/status`, `/api/results`, `/api/cancel`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", post(post_scan))
        .route("/results", get(get_results))
        .route("/cancel", post(post_cancel))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

pub async fn spawn_server(bind: &str) -> Result<()> {
    let app = router(AppState::default());
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    info!("serving API on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(s.status()))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(res) = s.results.as_ref() {
        (StatusCode::OK, Json(res.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_cancel(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    match s.cancel.as_ref() {
        Some(c) => {
            c.cancel();
            (StatusCode::ACCEPTED, Json(s.status())).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn post_scan(State(app): State<AppState>, Json(config): Json<ScanConfig>) -> impl IntoResponse {
    // Configuration errors are rejected before anything is spawned.
    let scanner = match Scanner::new(config) {
        Ok(s) => s,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid scan request: {e}")).into_response(),
    };
    let progress = scanner.state();
    let cancel = scanner.cancel_token();

    let generation = {
        let mut s = app.inner.write().await;
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.generation += 1;
        s.progress = Some(progress.clone());
        s.cancel = Some(cancel);
        s.results = None;
        s.last_error = None;
        s.generation
    };

    let status = Status { phase: progress.phase(), progress: progress.progress(), error: None };

    let app2 = app.clone();
    tokio::spawn(async move {
        let res = scanner.run().await;

        let mut s = app2.inner.write().await;
        if s.generation != generation {
            return;
        }
        s.progress = None;
        s.cancel = None;
        match res {
            Ok(report) => {
                progress.set_phase(ScanPhase::Reported);
                s.results = Some(report);
            }
            Err(e) => {
                warn!("scan error: {e}");
                s.last_error = Some(e.to_string());
            }
        }
    });

    (StatusCode::ACCEPTED, Json(status)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn idle_server_reports_idle_and_no_results() {
        let app = router(AppState::default());
        let (code, body) = call(&app, "GET", "/api/status", None).await;
        assert_eq!(code, StatusCode::OK);
        let st: Status = serde_json::from_str(&body).unwrap();
        assert_eq!(st.phase, ScanPhase::Idle);

        let (code, _) = call(&app, "GET", "/api/results", None).await;
        assert_eq!(code, StatusCode::NO_CONTENT);

        let (code, _) = call(&app, "POST", "/api/cancel", None).await;
        assert_eq!(code, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn bad_port_spec_is_rejected() {
        let app = router(AppState::default());
        let (code, body) =
            call(&app, "POST", "/api/scan", Some(r#"{"target":"127.0.0.1","ports":"http"}"#)).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid port value"));
    }

    #[tokio::test]
    async fn unresolvable_target_ends_in_failed_phase() {
        let app = router(AppState::default());
        let req = r#"{"target":"no-such-host.invalid","ports":"80","timeout_ms":200}"#;
        let (code, _) = call(&app, "POST", "/api/scan", Some(req)).await;
        assert_eq!(code, StatusCode::ACCEPTED);

        let mut failed = None;
        for _ in 0..250 {
            let (_, body) = call(&app, "GET", "/api/status", None).await;
            let st: Status = serde_json::from_str(&body).unwrap();
            if st.phase == ScanPhase::Failed {
                failed = Some(st);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let st = failed.expect("scan failed");
        assert!(st.error.unwrap().contains("no-such-host.invalid"));
        assert_eq!(st.progress.scanned, 0);

        let (code, _) = call(&app, "GET", "/api/results", None).await;
        assert_eq!(code, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn scan_runs_to_reported_results() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let app = router(AppState::default());
        let req = format!(
            r#"{{"target":"127.0.0.1","ports":"{port}","timeout_ms":500,"banner":false}}"#
        );
        let (code, _) = call(&app, "POST", "/api/scan", Some(&req)).await;
        assert_eq!(code, StatusCode::ACCEPTED);

        let mut reported = None;
        for _ in 0..100 {
            let (_, body) = call(&app, "GET", "/api/status", None).await;
            let st: Status = serde_json::from_str(&body).unwrap();
            if st.phase == ScanPhase::Reported {
                reported = Some(st);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let st = reported.expect("scan finished");
        assert_eq!((st.progress.total, st.progress.scanned, st.progress.open), (1, 1, 1));

        let (code, body) = call(&app, "GET", "/api/results", None).await;
        assert_eq!(code, StatusCode::OK);
        let report: ScanReport = serde_json::from_str(&body).unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].open);
        assert_eq!(report.results[0].port, port);
    }
}
