//! HTTP 上传/下载服务器
//!
//! 基于 axum，每个连接由独立的 tokio 任务处理，请求之间不共享可变状态。
//!
//! # 路由
//!
//! | 方法 | 路径 | 行为 |
//! |------|------|------|
//! | `GET`/`HEAD` | `/{name}` | 先查服务目录，再查 `uploads/` |
//! | `GET`/`HEAD` | `/uploads/{name}` | 只查 `uploads/` |
//! | `PUT`/`POST` | `/{name}` 或 `/uploads/{name}` | 写入 `uploads/{name}` |
//!
//! 同名文件并发上传时，最后完成的写入生效。

mod handlers;
pub mod paths;

use log::{error, info};

use axum::{Router, extract::DefaultBodyLimit};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::error::{ConfigError, ServeError};

/// 处理器共享的只读目录信息
#[derive(Debug)]
pub struct ServeRoot {
    pub base_dir: PathBuf,
    pub uploads_dir: PathBuf,
    /// `base_dir` 的规范化路径，用于包含性检查
    canonical_base: PathBuf,
    /// 宽限期结束时取消，进行中的上传/下载随之终止
    abort: CancellationToken,
}

impl ServeRoot {
    pub fn new(base_dir: PathBuf, uploads_dir: PathBuf, abort: CancellationToken) -> Self {
        let canonical_base = std::fs::canonicalize(&base_dir).unwrap_or_else(|_| base_dir.clone());
        Self {
            base_dir,
            uploads_dir,
            canonical_base,
            abort,
        }
    }

    /// 解析符号链接后确认路径仍在服务目录之内
    async fn contain(&self, candidate: &Path, raw: &str) -> Result<PathBuf, ServeError> {
        let resolved = tokio::fs::canonicalize(candidate)
            .await
            .map_err(|_| ServeError::NotFound(raw.to_string()))?;
        if resolved.starts_with(&self.canonical_base) {
            Ok(resolved)
        } else {
            Err(ServeError::Forbidden(raw.to_string()))
        }
    }
}

/// 构建路由
///
/// 所有路径都交给同一个分发器，以便对原始路径统一做穿越检查。
pub fn router(config: &ServerConfig) -> Router {
    build_router(config, CancellationToken::new())
}

fn build_router(config: &ServerConfig, abort: CancellationToken) -> Router {
    let root = Arc::new(ServeRoot::new(
        config.base_dir.clone(),
        config.uploads_dir.clone(),
        abort,
    ));

    Router::new()
        .fallback(handlers::dispatch)
        .layer(DefaultBodyLimit::disable())
        .with_state(root)
}

/// 已绑定端口、尚未开始服务的服务器
///
/// 绑定在启动阶段完成，这样端口冲突可以在显示 UI 之前报告。
pub struct FileServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
    abort: CancellationToken,
}

impl FileServer {
    pub async fn bind(config: &ServerConfig) -> Result<Self, ConfigError> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ConfigError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ConfigError::Bind { addr, source })?;

        let abort = CancellationToken::new();
        Ok(Self {
            listener,
            router: build_router(config, abort.clone()),
            local_addr,
            abort,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 在后台任务中运行，直到 `shutdown` 被取消
    pub fn spawn(self, shutdown: CancellationToken) -> ServerHandle {
        let FileServer {
            listener,
            router,
            local_addr,
            abort,
        } = self;
        let token = shutdown.clone();
        info!("File server listening on {}", local_addr);

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result
        });

        ServerHandle {
            task,
            shutdown,
            abort,
            local_addr,
        }
    }
}

/// 中止传输后等待连接关闭的时间
const ABORT_DRAIN: Duration = Duration::from_millis(500);

/// 运行中的服务器
pub struct ServerHandle {
    task: JoinHandle<io::Result<()>>,
    shutdown: CancellationToken,
    abort: CancellationToken,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止接受新连接，给进行中的传输 `grace` 时间
    ///
    /// 超时后中止所有传输（未完成的上传会被删除），仍未退出则强制终止任务。
    pub async fn shutdown(self, grace: Duration) {
        self.shutdown.cancel();
        let mut task = self.task;
        let result = match tokio::time::timeout(grace, &mut task).await {
            Ok(result) => result,
            Err(_) => {
                info!(
                    "Transfers still running after {} ms, aborting",
                    grace.as_millis()
                );
                self.abort.cancel();
                match tokio::time::timeout(ABORT_DRAIN, &mut task).await {
                    Ok(result) => result,
                    Err(_) => {
                        task.abort();
                        error!("File server did not stop, task aborted");
                        return;
                    }
                }
            }
        };

        match result {
            Ok(Ok(())) => info!("File server stopped"),
            Ok(Err(e)) => error!("File server exited with error: {}", e),
            Err(e) => error!("File server task failed: {}", e),
        }
    }
}
