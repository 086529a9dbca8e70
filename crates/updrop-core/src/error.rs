//! 错误类型
//!
//! - [`ServeError`]: HTTP 请求处理错误，直接转换为响应
//! - [`SnapshotError`]: 目录快照失败（整个目录不可读）
//! - [`ConfigError`]: 启动配置错误

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;

/// 单个请求的处理错误
///
/// 所有变体都只影响当前请求，服务器继续运行。
#[derive(Debug, Error)]
pub enum ServeError {
    /// 请求路径试图离开服务目录（`..`、绝对路径等）
    #[error("rejected path: {0}")]
    Traversal(String),

    /// 路径合法，但解析后（跟随符号链接）位于服务目录之外
    #[error("path escapes served directory: {0}")]
    Forbidden(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// 写入或读取文件失败（磁盘满、权限不足……）
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 客户端在上传过程中断开或发送了损坏的请求体
    #[error("request body error: {0}")]
    Body(String),

    /// 关闭宽限期已过，进行中的传输被中止
    #[error("server shutting down")]
    ShuttingDown,
}

impl ServeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::Traversal(_) | ServeError::Body(_) => StatusCode::BAD_REQUEST,
            ServeError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServeError::NotFound(_) => StatusCode::NOT_FOUND,
            ServeError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ServeError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ServeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 内部错误细节只写日志，不返回给客户端
        let body = match &self {
            ServeError::Io { .. } => "I/O error.\n".to_string(),
            ServeError::NotFound(_) => "File not found.\n".to_string(),
            other => format!("{other}\n"),
        };

        if let ServeError::MethodNotAllowed(_) = self {
            return (status, [(header::ALLOW, "GET, HEAD, PUT, POST")], body).into_response();
        }
        (status, body).into_response()
    }
}

/// 目录快照错误
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot timed out after {0} ms")]
    Timeout(u64),

    /// 后台遍历任务 panic 或被取消
    #[error("snapshot task failed: {0}")]
    Task(String),
}

/// 启动配置错误（在显示 UI 之前报告）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("directory does not exist: {0}")]
    MissingDir(PathBuf),

    #[error("path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("cannot prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServeError::Traversal("../x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServeError::Forbidden("link".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServeError::NotFound("a".into()).status(),
            StatusCode::NOT_FOUND
        );
        let io = ServeError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ServeError::ShuttingDown.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_method_not_allowed_has_allow_header() {
        let resp = ServeError::MethodNotAllowed("DELETE".into()).into_response();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            resp.headers().get(header::ALLOW).unwrap(),
            "GET, HEAD, PUT, POST"
        );
    }
}
