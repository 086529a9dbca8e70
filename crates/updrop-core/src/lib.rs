//! Updrop Core Library
//!
//! 临时文件交换点的核心实现：一个 HTTP 上传/下载服务器，以及终端仪表盘
//! 所需的目录快照和客户端命令生成。
//!
//! # 模块
//!
//! - **server**: axum 上传/下载服务器
//! - **snapshot**: 服务目录及 `uploads/` 的文件列表
//! - **commands**: wget/curl/PowerShell/certutil 命令模板
//! - **config**: 服务器配置和持久化设置
//! - **net**: 网卡 IPv4 地址检测
//!
//! # 使用示例
//!
//! ```ignore
//! use updrop_core::{CommandFormatter, FileServer, ServerConfig, snapshot};
//! use tokio_util::sync::CancellationToken;
//!
//! // 1. 准备目录并绑定端口
//! let config = ServerConfig::prepare(Path::new("."), 8000, None, "10.10.14.5")?;
//! let server = FileServer::bind(&config).await?;
//! let handle = server.spawn(CancellationToken::new());
//!
//! // 2. 列出文件并生成下载命令
//! let snap = snapshot(&config.base_dir, &config.uploads_dir)?;
//! if let Some(entry) = snap.get(0) {
//!     let set = CommandFormatter::default().download_commands_for("10.10.14.5", 8000, entry);
//!     println!("{}", set.url);
//! }
//!
//! // 3. 停止服务器
//! handle.shutdown(Duration::from_secs(3)).await;
//! ```

pub mod commands;
pub mod config;
pub mod digest;
pub mod error;
pub mod format;
pub mod logging;
pub mod net;
pub mod server;
pub mod snapshot;

pub use commands::{Command, CommandFormatter, CommandSet, CommandTemplate};
pub use config::{PLACEHOLDER_IP, ServerConfig, Settings};
pub use error::{ConfigError, ServeError, SnapshotError};
pub use logging::{LogBuffer, LogEntry, LogLevel};
pub use server::{FileServer, ServerHandle};
pub use snapshot::{
    DirectorySnapshot, FileEntry, Origin, PARTIAL_SUFFIX, UPLOADS_DIR_NAME, UPLOADS_PREFIX, snapshot,
};
