use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// JSON envelope shared by every management endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: String,
}

impl ApiResponse {
    fn build(success: bool, message: Option<String>, data: Option<Value>) -> Self {
        ApiResponse {
            success,
            message,
            data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::build(true, None, Some(data))
    }

    pub fn ok_message(message: impl Into<String>, data: Option<Value>) -> Self {
        Self::build(true, Some(message.into()), data)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::build(false, Some(message.into()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_envelope_omits_data() {
        let v = serde_json::to_value(ApiResponse::error("nope")).unwrap();
        assert_eq!(v["success"], json!(false));
        assert_eq!(v["message"], json!("nope"));
        assert!(v.get("data").is_none());
        assert!(v["timestamp"].is_string());
    }
}
