use std::path::PathBuf;

use crate::settings::SettingsError;

/// 客户端错误
///
/// 除 `test_connection` 外，所有操作都把底层错误原样交给调用方。
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request timed out")]
    TimedOut,

    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("http error: {0}")]
    Http(reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("invalid source file: {}", .0.display())]
    InvalidSource(PathBuf),

    #[error("failed to save settings: {0}")]
    Settings(#[from] SettingsError),
}

impl ClientError {
    /// HTTP 状态码（仅 `Status` 错误）
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 服务器返回 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

}

impl From<tokio::time::error::Elapsed> for ClientError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ClientError::TimedOut
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::TimedOut
        } else if e.is_connect() {
            ClientError::Unreachable(e.to_string())
        } else {
            ClientError::Http(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        let err = ClientError::Status {
            status: 404,
            body: "File not found".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "server returned 404: File not found");

        let err = ClientError::Status {
            status: 500,
            body: String::new(),
        };
        assert!(!err.is_not_found());
        assert_eq!(ClientError::TimedOut.status(), None);
    }
}
