//! Status HTTP server
//!
//! Exposes the queue summary and the session's jobs as JSON for scripts and
//! dashboards.

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use thiserror::Error;

use crate::jobs::Job;
use crate::scheduler::Scheduler;
use crate::status::StatusSnapshot;

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),

    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),
}

/// Handler for GET /status
async fn get_status(State(scheduler): State<Scheduler>) -> Json<StatusSnapshot> {
    Json(scheduler.status())
}

/// Handler for GET /jobs
async fn get_jobs(State(scheduler): State<Scheduler>) -> Json<Vec<Job>> {
    Json(scheduler.jobs())
}

/// Creates the axum Router with the status endpoints
pub fn create_status_router(scheduler: Scheduler) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/jobs", get(get_jobs))
        .with_state(scheduler)
}

/// Runs the status server on `bind` until the task is dropped.
pub async fn run_status_server(scheduler: Scheduler, bind: &str) -> Result<(), ServerError> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind.to_string()))?;
    let app = create_status_router(scheduler);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("status server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folders::WatchFolders;
    use crate::presets;
    use crate::scheduler::SchedulerSettings;
    use crate::supervisor::Supervisor;
    use crate::testing::{fake_ffmpeg, fake_ffprobe};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clipper_config::{GifConfig, LoopConfig, ToolsConfig};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn scheduler(temp: &TempDir) -> Scheduler {
        let folders = WatchFolders::create(&temp.path().join("base")).unwrap();
        let supervisor = Supervisor::new(&ToolsConfig {
            ffmpeg_bin: fake_ffmpeg(temp.path()),
            ffprobe_bin: fake_ffprobe(temp.path(), 2.0),
            probe_timeout_secs: 5,
            progress_interval_ms: 0,
        });
        let settings = SchedulerSettings {
            default_preset: presets::lookup("web").unwrap(),
            gif: GifConfig::default(),
            loop_: LoopConfig::default(),
            delete_source: true,
        };
        Scheduler::new(Arc::new(supervisor), folders, settings, 16)
    }

    async fn get_json(app: Router, uri: &str) -> serde_json::Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response
            .headers()
            .get("content-type")
            .expect("should have content-type header");
        assert!(content_type.to_str().unwrap().contains("application/json"));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_status_on_empty_session() {
        let temp = TempDir::new().unwrap();
        let app = create_status_router(scheduler(&temp));

        let status: StatusSnapshot = serde_json::from_value(get_json(app, "/status").await).unwrap();
        assert_eq!(status.total(), 0);
        assert!(!status.halted);
    }

    #[tokio::test]
    async fn test_jobs_lists_session_jobs() {
        let temp = TempDir::new().unwrap();
        let scheduler = scheduler(&temp);
        let inbox = scheduler.folders().inbox.clone();
        std::fs::write(inbox.join("clip-gif.mp4"), b"video").unwrap();
        scheduler.enqueue(inbox.join("clip-gif.mp4")).await.unwrap();
        scheduler.wait_idle().await;

        let jobs = get_json(create_status_router(scheduler.clone()), "/jobs").await;
        let jobs = jobs.as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["mode"], "gif");
        assert_eq!(jobs[0]["output_name"], "clip.gif");
        assert_eq!(jobs[0]["status"], "done");

        let status = get_json(create_status_router(scheduler), "/status").await;
        assert_eq!(status["done"], 1);
        assert_eq!(status["queued"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let temp = TempDir::new().unwrap();
        let response = create_status_router(scheduler(&temp))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_bind_address() {
        let temp = TempDir::new().unwrap();
        let err = run_status_server(scheduler(&temp), "not an address")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::InvalidAddress(_)));
    }
}
