//! HTTP surface under `/api`

use crate::error::ServiceError;
use crate::service::{AnalyticsReport, HealthReport, RegretService, ServiceInfo};
use crate::types::{AnalysisResult, StatusCheck, UserSettings, DEFAULT_THRESHOLD};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

pub type SharedService = Arc<RegretService>;

#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    pub text: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct UserSettingsRequest {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusCheckCreate {
    pub client_name: String,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

/// Error response rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    /// Validation failures keep their message; anything else is logged and
    /// replaced by `generic`.
    fn from_service(err: ServiceError, generic: &str) -> Self {
        if err.is_validation() {
            return Self::bad_request(err.to_string());
        }
        error!(error = %err, "{}", generic);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: generic.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

/// `Json` whose rejections use the `{"detail": ...}` error body
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

fn check_threshold(threshold: f64) -> Result<(), ApiError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Threshold must be between 0 and 1"))
    }
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/api", get(root))
        .route("/api/", get(root))
        .route("/api/health", get(health))
        .route("/api/analyze-text", post(analyze_text))
        .route("/api/user-settings", post(save_user_settings))
        .route("/api/user-settings/{user_id}", get(get_user_settings))
        .route("/api/analytics", get(analytics))
        .route("/api/status", post(create_status_check).get(list_status_checks))
        .with_state(service)
}

async fn root(State(service): State<SharedService>) -> Json<ServiceInfo> {
    Json(service.root_info())
}

async fn health(State(service): State<SharedService>) -> Json<HealthReport> {
    Json(service.health())
}

async fn analyze_text(
    State(service): State<SharedService>,
    ApiJson(request): ApiJson<AnalyzeTextRequest>,
) -> Result<Json<AnalysisResult>, ApiError> {
    check_threshold(request.threshold)?;
    service
        .analyze_text(request.text, request.threshold)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_service(e, "Internal server error during text analysis"))
}

async fn save_user_settings(
    State(service): State<SharedService>,
    ApiJson(request): ApiJson<UserSettingsRequest>,
) -> Result<Json<UserSettings>, ApiError> {
    check_threshold(request.threshold)?;
    service
        .save_settings(request.user_id, request.threshold)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_service(e, "Failed to save user settings"))
}

async fn get_user_settings(
    State(service): State<SharedService>,
    Path(user_id): Path<String>,
) -> Result<Json<UserSettings>, ApiError> {
    service
        .get_settings(&user_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_service(e, "Failed to get user settings"))
}

async fn analytics(State(service): State<SharedService>) -> Result<Json<AnalyticsReport>, ApiError> {
    service
        .analytics()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_service(e, "Failed to get analytics"))
}

async fn create_status_check(
    State(service): State<SharedService>,
    ApiJson(request): ApiJson<StatusCheckCreate>,
) -> Result<Json<StatusCheck>, ApiError> {
    service
        .record_status(request.client_name)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_service(e, "Failed to record status check"))
}

async fn list_status_checks(
    State(service): State<SharedService>,
) -> Result<Json<Vec<StatusCheck>>, ApiError> {
    service
        .list_status()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_service(e, "Failed to get status checks"))
}
