//! Image record and action types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Largest accepted output width or height.
pub const MAX_DIMENSION: u32 = 10_000;

/// Text rendered when a watermark action carries none.
pub const DEFAULT_WATERMARK_TEXT: &str = "Watermark";

/// Lifecycle status of an image record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    /// Original uploaded, job queued.
    Pending,
    /// Derived artifact materialized.
    Processed,
    /// Job could not be scheduled.
    Failed,
}

impl ImageStatus {
    pub const ALL: [ImageStatus; 3] = [Self::Pending, Self::Processed, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Processed => "processed",
            ImageStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImageStatus::Pending),
            "processed" => Ok(ImageStatus::Processed),
            "failed" => Ok(ImageStatus::Failed),
            other => Err(format!("unknown image status: {}", other)),
        }
    }
}

/// Exact output size for resize and thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn validate(&self) -> Result<(), ActionError> {
        check_dimension("width", self.width)?;
        check_dimension("height", self.height)
    }
}

/// Parameters of the watermark action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkParams {
    #[serde(default = "default_watermark_text")]
    pub text: String,
}

impl WatermarkParams {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The text to render; blank text falls back to the default.
    pub fn effective_text(&self) -> &str {
        if self.text.trim().is_empty() {
            DEFAULT_WATERMARK_TEXT
        } else {
            &self.text
        }
    }
}

impl Default for WatermarkParams {
    fn default() -> Self {
        Self::new(DEFAULT_WATERMARK_TEXT)
    }
}

fn default_watermark_text() -> String {
    DEFAULT_WATERMARK_TEXT.to_string()
}

/// A transformation to apply to an uploaded image.
///
/// Serialized as `{"name": "resize", "params": {"width": 200, "height": 100}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "params", rename_all = "lowercase")]
pub enum Action {
    /// Scale to exactly the given size, ignoring aspect ratio.
    Resize(Dimensions),
    /// Scale preserving aspect ratio and center-crop to exactly the given size.
    Thumbnail(Dimensions),
    /// Render text in the bottom-right corner.
    Watermark(WatermarkParams),
}

impl Action {
    /// Build an action from the loosely typed form submitted by clients.
    ///
    /// Parameter values may be JSON strings (`"200"`) or integers.
    pub fn from_request(name: &str, params: &Map<String, Value>) -> Result<Self, ActionError> {
        let action = match name.trim().to_ascii_lowercase().as_str() {
            "resize" => Action::Resize(dimensions_from_params(name, params)?),
            "thumbnail" => Action::Thumbnail(dimensions_from_params(name, params)?),
            "watermark" => {
                let text = match params.get("text") {
                    None | Some(Value::Null) => DEFAULT_WATERMARK_TEXT.to_string(),
                    Some(Value::String(s)) if s.trim().is_empty() => {
                        DEFAULT_WATERMARK_TEXT.to_string()
                    }
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => {
                        return Err(ActionError::InvalidParam {
                            param: "text".to_string(),
                            value: other.to_string(),
                        })
                    }
                };
                Action::Watermark(WatermarkParams { text })
            }
            _ => return Err(ActionError::UnknownAction(name.to_string())),
        };
        Ok(action)
    }

    /// Check parameter ranges. Records arriving from the queue are checked
    /// again before any I/O happens.
    pub fn validate(&self) -> Result<(), ActionError> {
        match self {
            Action::Resize(dims) | Action::Thumbnail(dims) => dims.validate(),
            Action::Watermark(_) => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Resize(_) => "resize",
            Action::Thumbnail(_) => "thumbnail",
            Action::Watermark(_) => "watermark",
        }
    }

    /// Artifact namespace the derived image is written to.
    pub fn namespace(&self) -> &'static str {
        match self {
            Action::Resize(_) => "resized",
            Action::Thumbnail(_) => "thumbnails",
            Action::Watermark(_) => "watermarked",
        }
    }
}

fn dimensions_from_params(
    action: &str,
    params: &Map<String, Value>,
) -> Result<Dimensions, ActionError> {
    let width = integer_param(action, params, "width")?;
    let height = integer_param(action, params, "height")?;
    let dims = Dimensions { width, height };
    dims.validate()?;
    Ok(dims)
}

fn integer_param(
    action: &str,
    params: &Map<String, Value>,
    key: &str,
) -> Result<u32, ActionError> {
    let value = params.get(key).ok_or_else(|| ActionError::MissingParam {
        action: action.to_string(),
        param: key.to_string(),
    })?;

    let invalid = || ActionError::InvalidParam {
        param: key.to_string(),
        value: value.to_string(),
    };

    let n: i64 = match value {
        Value::Number(n) => n.as_i64().ok_or_else(invalid)?,
        Value::String(s) => s.trim().parse().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if n < 1 || n > i64::from(MAX_DIMENSION) {
        return Err(ActionError::OutOfRange {
            param: key.to_string(),
            value: n,
        });
    }
    Ok(n as u32)
}

fn check_dimension(param: &str, value: u32) -> Result<(), ActionError> {
    if value == 0 || value > MAX_DIMENSION {
        return Err(ActionError::OutOfRange {
            param: param.to_string(),
            value: i64::from(value),
        });
    }
    Ok(())
}

/// Invalid action input. Never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("action {action} requires parameter {param}")]
    MissingParam { action: String, param: String },

    #[error("invalid value for {param}: {value}")]
    InvalidParam { param: String, value: String },

    #[error("{param} must be between 1 and {max}, got {value}", max = MAX_DIMENSION)]
    OutOfRange { param: String, value: i64 },
}

/// A stored image, either an upload or a derived variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// Source record, set only on derived images.
    #[serde(default)]
    pub original_id: Option<Uuid>,
    pub filename: String,
    /// Location in the artifact store.
    #[serde(rename = "file_path")]
    pub path: String,
    pub action: Action,
    pub status: ImageStatus,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    pub fn is_derived(&self) -> bool {
        self.original_id.is_some()
    }
}

/// Insert payload; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub original_id: Option<Uuid>,
    pub filename: String,
    pub path: String,
    pub action: Action,
    pub status: ImageStatus,
}

impl NewImage {
    /// A freshly uploaded original awaiting processing.
    pub fn original(filename: impl Into<String>, path: impl Into<String>, action: Action) -> Self {
        Self {
            original_id: None,
            filename: filename.into(),
            path: path.into(),
            action,
            status: ImageStatus::Pending,
        }
    }

    /// The processed variant of `source`.
    pub fn derived(source: &ImageRecord, path: impl Into<String>) -> Self {
        Self {
            original_id: Some(source.id),
            filename: source.filename.clone(),
            path: path.into(),
            action: source.action.clone(),
            status: ImageStatus::Processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_action_json_shape() {
        let action = Action::Resize(Dimensions::new(200, 100));
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(
            json,
            json!({"name": "resize", "params": {"width": 200, "height": 100}})
        );

        let parsed: Action = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, action);
    }

    #[test]
    fn test_watermark_text_defaults_when_missing() {
        let parsed: Action =
            serde_json::from_value(json!({"name": "watermark", "params": {}})).unwrap();
        assert_eq!(parsed, Action::Watermark(WatermarkParams::default()));
    }

    #[test]
    fn test_unknown_action_name_rejected_on_deserialize() {
        let result: Result<Action, _> =
            serde_json::from_value(json!({"name": "blur", "params": {}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_request_accepts_string_values() {
        let action =
            Action::from_request("resize", &params(json!({"width": "200", "height": "100"})))
                .unwrap();
        assert_eq!(action, Action::Resize(Dimensions::new(200, 100)));
    }

    #[test]
    fn test_from_request_accepts_integers() {
        let action =
            Action::from_request("thumbnail", &params(json!({"width": 64, "height": 64})))
                .unwrap();
        assert_eq!(action, Action::Thumbnail(Dimensions::new(64, 64)));
        assert_eq!(action.namespace(), "thumbnails");
    }

    #[test]
    fn test_from_request_missing_param() {
        let err = Action::from_request("resize", &params(json!({"width": "200"}))).unwrap_err();
        assert!(matches!(err, ActionError::MissingParam { ref param, .. } if param == "height"));
    }

    #[test]
    fn test_from_request_non_numeric() {
        let err = Action::from_request("resize", &params(json!({"width": "wide", "height": "1"})))
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParam { .. }));
    }

    #[test]
    fn test_from_request_out_of_range() {
        let err = Action::from_request("resize", &params(json!({"width": 0, "height": 10})))
            .unwrap_err();
        assert!(matches!(err, ActionError::OutOfRange { value: 0, .. }));

        let err = Action::from_request("resize", &params(json!({"width": 10, "height": 10001})))
            .unwrap_err();
        assert!(matches!(err, ActionError::OutOfRange { value: 10001, .. }));
    }

    #[test]
    fn test_from_request_unknown_action() {
        let err = Action::from_request("sepia", &Map::new()).unwrap_err();
        assert_eq!(err, ActionError::UnknownAction("sepia".to_string()));
    }

    #[test]
    fn test_from_request_watermark_empty_text() {
        let action = Action::from_request("watermark", &params(json!({"text": ""}))).unwrap();
        assert_eq!(action, Action::Watermark(WatermarkParams::default()));

        let action =
            Action::from_request("Watermark", &params(json!({"text": "Copyright"}))).unwrap();
        assert_eq!(action, Action::Watermark(WatermarkParams::new("Copyright")));
    }

    #[test]
    fn test_validate_catches_queue_payload_out_of_range() {
        let action: Action = serde_json::from_value(
            json!({"name": "thumbnail", "params": {"width": 0, "height": 50}}),
        )
        .unwrap();
        assert!(action.validate().is_err());
    }

    #[test]
    fn test_effective_text() {
        assert_eq!(WatermarkParams::new("  ").effective_text(), "Watermark");
        assert_eq!(WatermarkParams::new("Hi").effective_text(), "Hi");
    }

    #[test]
    fn test_status_round_trip() {
        for status in ImageStatus::ALL {
            assert_eq!(status.as_str().parse::<ImageStatus>().unwrap(), status);
        }
        assert!("done".parse::<ImageStatus>().is_err());
    }

    #[test]
    fn test_record_wire_field_names() {
        let record = ImageRecord {
            id: Uuid::new_v4(),
            original_id: None,
            filename: "cat.png".to_string(),
            path: "original/cat.png".to_string(),
            action: Action::Watermark(WatermarkParams::default()),
            status: ImageStatus::Pending,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file_path"], "original/cat.png");
        assert_eq!(json["status"], "pending");
        assert!(json["original_id"].is_null());

        let back: ImageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_new_image_derived_copies_source() {
        let source = ImageRecord {
            id: Uuid::new_v4(),
            original_id: None,
            filename: "dog.jpg".to_string(),
            path: "original/abc-dog.jpg".to_string(),
            action: Action::Resize(Dimensions::new(10, 20)),
            status: ImageStatus::Pending,
            created_at: Utc::now(),
        };
        let derived = NewImage::derived(&source, "resized/abc-dog.jpg");
        assert_eq!(derived.original_id, Some(source.id));
        assert_eq!(derived.filename, "dog.jpg");
        assert_eq!(derived.action, source.action);
        assert_eq!(derived.status, ImageStatus::Processed);
    }
}
