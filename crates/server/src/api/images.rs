//! Image API handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use imgqueue_core::{Action, ImageRecord, SavedImage, ServiceError};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// JSON carried in the `actions` multipart field.
#[derive(Debug, Deserialize)]
pub struct ActionBody {
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler error carrying its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Image request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid image id: {}", raw)))
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload an image together with the action to apply to it.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SavedImage>, ApiError> {
    let mut image: Option<(String, Vec<u8>)> = None;
    let mut action: Option<Action> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Rejected multipart upload: {}", e);
                return Err(ApiError {
                    status: e.status(),
                    message: e.body_text(),
                });
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError {
                    status: e.status(),
                    message: format!("Failed to read image: {}", e.body_text()),
                })?;
                image = Some((filename, bytes.to_vec()));
            }
            "actions" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read actions: {}", e)))?;
                let body: ActionBody = serde_json::from_str(&text)
                    .map_err(|e| ApiError::bad_request(format!("Invalid actions JSON: {}", e)))?;
                let parsed = Action::from_request(&body.action, &body.params)
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                action = Some(parsed);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        image.ok_or_else(|| ApiError::bad_request("Missing 'image' file part"))?;
    let action = action.ok_or_else(|| ApiError::bad_request("Missing 'actions' field"))?;

    let saved = state.service().save_image(&filename, &bytes, action).await?;
    Ok(Json(saved))
}

/// Raw image bytes, never cached.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let (_, bytes) = state.service().get_image(id).await?;

    let content_type = image::guess_format(&bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    Ok(response)
}

/// Record metadata without the image bytes.
pub async fn get_meta(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ImageRecord>, ApiError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service().get_meta(id)?))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.service().delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgqueue_core::images::ImageStoreError;

    #[test]
    fn test_service_errors_map_to_status() {
        let not_found: ApiError = ServiceError::NotFound(Uuid::nil()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let invalid: ApiError = ServiceError::Validation("bad".into()).into();
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);

        let db: ApiError = ServiceError::Store(ImageStoreError::Database("down".into())).into();
        assert_eq!(db.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_parse_id_rejects_garbage() {
        assert_eq!(parse_id("nope").unwrap_err().status, StatusCode::BAD_REQUEST);
        assert!(parse_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }

    #[test]
    fn test_action_body_params_default_to_empty() {
        let body: ActionBody = serde_json::from_str(r#"{"action":"watermark"}"#).unwrap();
        assert!(body.params.is_empty());
        assert!(Action::from_request(&body.action, &body.params).is_ok());
    }
}
