use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

/// Uniform reply of every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CommandResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: (!data.is_null()).then_some(data),
            error: None,
            error_code: None,
        }
    }

    pub fn failure(err: &BridgeError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_code: Some(err.error_code().to_string()),
        }
    }
}

impl From<Result<Value, BridgeError>> for CommandResponse {
    fn from(r: Result<Value, BridgeError>) -> Self {
        match r {
            Ok(v) => Self::ok(v),
            Err(e) => Self::failure(&e),
        }
    }
}
