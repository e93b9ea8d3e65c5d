use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Error;
use crate::permissions::PermissionReport;
use crate::service::{AutoCallService, ServiceStatus};

type AppState = Arc<AutoCallService>;

#[derive(Debug)]
struct AppError {
    message: String,
    status: StatusCode,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        let status = match e {
            Error::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            message: e.to_string(),
            status,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[derive(Deserialize)]
struct ApiUrlRequest {
    url: String,
}

#[derive(Deserialize)]
struct StartQuery {
    #[serde(default)]
    force: bool,
}

async fn status(State(service): State<AppState>) -> Json<ServiceStatus> {
    Json(service.status())
}

async fn set_api_url(
    State(service): State<AppState>,
    Json(req): Json<ApiUrlRequest>,
) -> Result<StatusCode, AppError> {
    if req.url.trim().is_empty() {
        return Err(AppError::bad_request("please enter a valid url"));
    }
    service.prefs().set_api_url(&req.url)?;
    tracing::info!(url = %req.url.trim(), "api url saved");
    service.restart_if_running();
    Ok(StatusCode::OK)
}

async fn start_service(
    State(service): State<AppState>,
    Query(query): Query<StartQuery>,
) -> Response {
    let report = service.permissions();
    if !report.all_granted() && !query.force {
        tracing::warn!("refusing to start with missing permissions");
        return (StatusCode::CONFLICT, Json(report)).into_response();
    }
    service.start();
    StatusCode::OK.into_response()
}

async fn stop_service(State(service): State<AppState>) -> StatusCode {
    service.stop();
    StatusCode::OK
}

async fn hang_up(State(service): State<AppState>) -> Result<StatusCode, AppError> {
    service.hang_up()?;
    Ok(StatusCode::OK)
}

async fn permissions(State(service): State<AppState>) -> Json<PermissionReport> {
    Json(service.permissions())
}

async fn request_permissions(State(service): State<AppState>) -> Json<PermissionReport> {
    Json(service.request_permissions())
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/config/api-url", put(set_api_url))
        .route("/service/start", post(start_service))
        .route("/service/stop", post(stop_service))
        .route("/call/hang-up", post(hang_up))
        .route("/permissions", get(permissions))
        .route("/permissions/request", post(request_permissions))
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::fake::FakePlatform;
    use crate::prefs::{PreferenceStore, scratch_path};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn spawn(platform: FakePlatform) -> (String, Arc<AutoCallService>) {
        spawn_with(platform, Config::default()).await
    }

    async fn spawn_with(platform: FakePlatform, config: Config) -> (String, Arc<AutoCallService>) {
        let prefs = Arc::new(PreferenceStore::open(scratch_path("prefs.json")));
        let service = AutoCallService::new(&config, prefs, Arc::new(platform));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(service.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), service)
    }

    #[tokio::test]
    async fn start_requires_permissions() {
        let (base, service) = spawn(FakePlatform::new(34)).await;
        service.prefs().set_api_url("http://127.0.0.1:9/").unwrap();
        let http = reqwest::Client::new();

        let resp = http.post(format!("{base}/service/start")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CONFLICT);
        let report: Value = resp.json().await.unwrap();
        assert_eq!(report["overlay"], Value::Bool(false));
        assert!(!service.is_running());

        let resp = http
            .post(format!("{base}/service/start?force=true"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert!(service.is_running());
        service.stop();
    }

    #[tokio::test]
    async fn saves_url_and_reports_status() {
        let (base, service) = spawn(FakePlatform::fully_granted(34)).await;
        let http = reqwest::Client::new();

        let resp = http
            .put(format!("{base}/config/api-url"))
            .json(&serde_json::json!({ "url": "   " }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

        let resp = http
            .put(format!("{base}/config/api-url"))
            .json(&serde_json::json!({ "url": "http://10.0.2.2:9000/phone" }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(service.prefs().api_url(), "http://10.0.2.2:9000/phone");

        let status: Value = http
            .get(format!("{base}/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["api_url"], "http://10.0.2.2:9000/phone");
        assert_eq!(status["running"], Value::Bool(false));
        assert_eq!(status["call_active"], Value::Bool(false));
    }

    async fn counting_endpoint() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/",
            get(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { "{}" }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    #[tokio::test]
    async fn new_url_takes_over_running_poll_loop() {
        let (first, first_hits) = counting_endpoint().await;
        let (second, second_hits) = counting_endpoint().await;
        let config = Config {
            polling_interval: Duration::from_millis(100),
            ..Config::default()
        };
        let (base, service) = spawn_with(FakePlatform::fully_granted(34), config).await;
        service.prefs().set_api_url(&first).unwrap();
        let http = reqwest::Client::new();

        let resp = http.post(format!("{base}/service/start")).send().await.unwrap();
        assert!(resp.status().is_success());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(first_hits.load(Ordering::SeqCst) >= 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 0);

        let resp = http
            .put(format!("{base}/config/api-url"))
            .json(&serde_json::json!({ "url": second }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        tokio::time::sleep(Duration::from_millis(20)).await;
        let first_at_switch = first_hits.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(first_hits.load(Ordering::SeqCst), first_at_switch);
        assert!(second_hits.load(Ordering::SeqCst) >= 2);
        assert!(service.is_running());
        service.stop();
    }

    #[tokio::test]
    async fn permission_request_grants_runtime_group() {
        let (base, _service) = spawn(FakePlatform::new(34)).await;
        let report: Value = reqwest::Client::new()
            .post(format!("{base}/permissions/request"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let all_granted = report["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p["granted"] == Value::Bool(true));
        assert!(all_granted);
        assert_eq!(report["overlay"], Value::Bool(false));
    }

    #[tokio::test]
    async fn hang_up_without_call_is_ok() {
        let (base, _service) = spawn(FakePlatform::fully_granted(34)).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/call/hang-up"))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
    }
}
