use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::UNPROCESSABLE_ENTITY, message: msg.into() }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::NOT_FOUND, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<modrun_store::StoreError> for ApiError {
    fn from(e: modrun_store::StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<modrun_engine::SubmitError> for ApiError {
    fn from(e: modrun_engine::SubmitError) -> Self {
        if e.is_validation() {
            ApiError::unprocessable(e.to_string())
        } else {
            ApiError::internal(e.to_string())
        }
    }
}

impl From<modrun_assets::AssetError> for ApiError {
    fn from(e: modrun_assets::AssetError) -> Self {
        match e {
            modrun_assets::AssetError::SourceMissing(_) => ApiError::unprocessable(e.to_string()),
            modrun_assets::AssetError::NotFound(_) => ApiError::not_found(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<modrun_registry::RegistryError> for ApiError {
    fn from(e: modrun_registry::RegistryError) -> Self {
        ApiError::internal(e.to_string())
    }
}
