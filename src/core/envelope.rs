use serde::Deserialize;

use crate::core::error::{ApiError, ApiResult};

/// The `{success, message, code, data}` wrapper most endpoints answer with.
/// Every field is optional on the wire; absence of `success` is treated as
/// consent, only an explicit `false` is a refusal.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub code: Option<i32>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.success != Some(false) && self.data.is_some()
    }

    /// Rejects an explicit `success: false`, surfacing the server message
    /// when there is one. Returns whatever `data` came along.
    pub fn check(self, fallback: &str) -> ApiResult<Option<T>> {
        if self.success == Some(false) {
            return Err(ApiError::Api(
                self.message.unwrap_or_else(|| fallback.to_string()),
            ));
        }
        Ok(self.data)
    }

    /// Like `check`, but a missing `data` is also a failure. Used for
    /// endpoints whose payload the caller cannot do without.
    pub fn into_data(self, fallback: &str) -> ApiResult<T> {
        let message = self.message.clone();
        match self.check(fallback)? {
            Some(data) => Ok(data),
            None => Err(ApiError::Api(
                message.unwrap_or_else(|| fallback.to_string()),
            )),
        }
    }
}

// --- Error body extraction ---

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
    error: Option<ErrorDetail>,
    data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    error: Option<ErrorDetail>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Digs the human-readable reason out of a non-2xx body. The backend is not
/// consistent about where it puts it, so `message`, `error.message` and
/// `data.error.message` are tried in that order; a body that is not JSON at
/// all is returned verbatim.
pub fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => non_blank(envelope.message)
            .or_else(|| non_blank(envelope.error.and_then(|e| e.message)))
            .or_else(|| {
                non_blank(
                    envelope
                        .data
                        .and_then(|d| d.error)
                        .and_then(|e| e.message),
                )
            })
            .unwrap_or_else(|| "服务器返回错误".to_string()),
        Err(_) => {
            if body.trim().is_empty() {
                "未知错误".to_string()
            } else {
                body.to_string()
            }
        }
    }
}
