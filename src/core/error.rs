use thiserror::Error;

/// Failure classes surfaced by the API layer.
///
/// Everything a caller can observe going wrong collapses into one of these:
/// the request never reached the server, the server said no, the body was
/// unreadable, the envelope refused us, or we refused to even send it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No HTTP response at all (DNS, connect, timeout).
    #[error("网络请求失败：{0}")]
    Transport(String),

    /// Non-2xx status; `message` is whatever the server body yielded.
    #[error("请求失败({status})：{message}")]
    Http { status: u16, message: String },

    /// A 2xx body that did not match the expected shape.
    #[error("解析数据失败：{0}")]
    Decode(String),

    /// The envelope reported failure or lacked its data.
    #[error("{0}")]
    Api(String),

    /// Rejected locally before any request was sent.
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display_carries_status_and_message() {
        let err = ApiError::Http {
            status: 403,
            message: "没有权限".to_string(),
        };
        assert_eq!(err.to_string(), "请求失败(403)：没有权限");
        assert_eq!(err.status(), Some(403));
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_unauthorized_detection() {
        let err = ApiError::Http {
            status: 401,
            message: "token 已过期".to_string(),
        };
        assert!(err.is_unauthorized());

        assert!(!ApiError::Api("配额不足".to_string()).is_unauthorized());
        assert_eq!(ApiError::Validation("x".to_string()).status(), None);
    }
}
