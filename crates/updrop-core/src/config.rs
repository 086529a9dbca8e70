//! 运行配置
//!
//! - [`ServerConfig`]: 进程启动时确定、之后只读的服务器参数
//! - [`Settings`]: 可选的持久化设置（`~/.config/updrop/settings.toml`）

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::commands::{CommandFormatter, CommandTemplate};
use crate::error::ConfigError;
use crate::snapshot::UPLOADS_DIR_NAME;

/// 无法检测到地址时，命令中使用的占位符
pub const PLACEHOLDER_IP: &str = "YOUR_IP";

/// 服务器配置
///
/// `uploads_dir` 总是 `base_dir/uploads`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_ip: IpAddr,
    pub port: u16,
    /// 写进客户端命令中的地址（`--ip` 或网卡检测结果）
    pub advertise_ip: String,
    pub base_dir: PathBuf,
    pub uploads_dir: PathBuf,
}

impl ServerConfig {
    /// 校验服务目录并创建 `uploads/`
    ///
    /// `base_dir` 被规范化为绝对路径。
    pub fn prepare(
        base_dir: &Path,
        port: u16,
        bind_ip: Option<IpAddr>,
        advertise_ip: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        if !base_dir.exists() {
            return Err(ConfigError::MissingDir(base_dir.to_path_buf()));
        }
        if !base_dir.is_dir() {
            return Err(ConfigError::NotADirectory(base_dir.to_path_buf()));
        }
        let base_dir = fs::canonicalize(base_dir).map_err(|source| ConfigError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;

        let uploads_dir = base_dir.join(UPLOADS_DIR_NAME);
        fs::create_dir_all(&uploads_dir).map_err(|source| ConfigError::Io {
            path: uploads_dir.clone(),
            source,
        })?;
        debug!("Uploads directory ready: {:?}", uploads_dir);

        Ok(Self {
            bind_ip: bind_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port,
            advertise_ip: advertise_ip.into(),
            base_dir,
            uploads_dir,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}

/// 持久化设置
///
/// 所有字段都有默认值，设置文件中可以只写需要覆盖的部分。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 用于自动检测 IP 的网卡
    pub interface: String,
    /// 文件列表自动刷新间隔
    pub refresh_interval_ms: u64,
    /// 单次快照的超时
    pub snapshot_timeout_ms: u64,
    /// 退出时等待进行中传输的时间
    pub shutdown_grace_ms: u64,
    /// 自定义下载命令模板（为空则使用默认）
    pub download_templates: Vec<CommandTemplate>,
    /// 自定义上传命令模板（为空则使用默认）
    pub upload_templates: Vec<CommandTemplate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface: "tun0".to_string(),
            refresh_interval_ms: 1000,
            snapshot_timeout_ms: 2000,
            shutdown_grace_ms: 3000,
            download_templates: Vec::new(),
            upload_templates: Vec::new(),
        }
    }
}

impl Settings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("updrop")
            .join("settings.toml")
    }

    /// 加载设置（如果文件不存在或无法解析则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", path);
                    return settings;
                }
                Err(e) => warn!("Failed to parse settings: {}, using defaults", e),
            },
            Err(e) => warn!("Failed to read settings file: {}, using defaults", e),
        }
        Self::default()
    }

    pub fn refresh_interval(&self) -> Duration {
        // 过小的间隔会让 UI 忙于刷新
        Duration::from_millis(self.refresh_interval_ms.max(100))
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms.max(10))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn formatter(&self) -> CommandFormatter {
        CommandFormatter::new(
            self.download_templates.clone(),
            self.upload_templates.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_creates_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServerConfig::prepare(dir.path(), 8000, None, "10.0.0.1").unwrap();
        assert!(cfg.uploads_dir.is_dir());
        assert_eq!(cfg.uploads_dir, cfg.base_dir.join("uploads"));
        assert_eq!(cfg.bind_addr().to_string(), "0.0.0.0:8000");
        assert!(cfg.base_dir.is_absolute());
    }

    #[test]
    fn test_prepare_rejects_missing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ServerConfig::prepare(&missing, 1, None, "x"),
            Err(ConfigError::MissingDir(_))
        ));

        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            ServerConfig::prepare(&file, 1, None, "x"),
            Err(ConfigError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert_eq!(s.interface, "tun0");
        assert_eq!(s.refresh_interval(), Duration::from_secs(1));
        assert_eq!(s.formatter(), CommandFormatter::default());
    }

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            r#"
interface = "eth0"
refresh_interval_ms = 2500

[[download_templates]]
label = "aria2"
template = "aria2c {url}"
"#,
        )
        .unwrap();

        let s = Settings::load_from(&path);
        assert_eq!(s.interface, "eth0");
        assert_eq!(s.refresh_interval(), Duration::from_millis(2500));
        assert_eq!(s.snapshot_timeout_ms, 2000);
        assert_eq!(s.download_templates.len(), 1);

        let set = s.formatter().download_commands("h", 1, "f");
        assert_eq!(set.commands[0].text, "aria2c http://h:1/f");
    }

    #[test]
    fn test_broken_settings_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "refresh_interval_ms = \"soon\"").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
