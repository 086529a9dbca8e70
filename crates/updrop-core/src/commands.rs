//! 客户端命令生成
//!
//! 根据服务器地址和文件路径生成可直接复制的下载/上传命令。
//! 命令来自有序的模板列表（标签 → 模板字符串），模板中可使用：
//!
//! - `{url}`: 完整 URL，例如 `http://10.10.14.5:8000/uploads/report.pdf`；
//!   每个路径段都做百分号编码，服务器解码后得到原文件名
//! - `{file}`: 本地文件名（路径的最后一段），含空格等字符时加双引号
//!
//! 默认模板见 [`default_download_templates`] 和 [`default_upload_templates`]，
//! 可以在设置文件中覆盖。

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::snapshot::{FileEntry, UPLOADS_DIR_NAME, UPLOADS_PREFIX};

/// 一条命令模板
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub label: String,
    pub template: String,
}

impl CommandTemplate {
    pub fn new(label: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            template: template.into(),
        }
    }

    fn render(&self, url: &str, file: &str) -> Command {
        Command {
            label: self.label.clone(),
            text: self
                .template
                .replace("{url}", url)
                .replace("{file}", &shell_word(file)),
        }
    }
}

/// 渲染后的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub label: String,
    pub text: String,
}

/// 一组命令，以及它们共同指向的 URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    pub url: String,
    pub commands: Vec<Command>,
}

impl CommandSet {
    pub fn get(&self, label: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.label == label)
    }
}

pub fn default_download_templates() -> Vec<CommandTemplate> {
    vec![
        CommandTemplate::new("wget", "wget {url} -O {file}"),
        CommandTemplate::new("curl", "curl -o {file} {url}"),
        CommandTemplate::new("iwr", "iwr -uri {url} -Outfile {file}"),
        CommandTemplate::new(
            "Invoke-WebRequest",
            "Invoke-WebRequest -Uri {url} -Outfile {file}",
        ),
        CommandTemplate::new("certutil", "certutil.exe -urlcache -split -f {url} {file}"),
    ]
}

pub fn default_upload_templates() -> Vec<CommandTemplate> {
    vec![
        CommandTemplate::new("curl PUT", "curl.exe -X PUT --upload-file {file} {url}"),
        CommandTemplate::new("curl POST", "curl.exe -X POST --data-binary @{file} {url}"),
        CommandTemplate::new("wget PUT", "wget --method=PUT --body-file={file} {url}"),
        CommandTemplate::new("wget POST", "wget --method=POST --body-file={file} {url}"),
        CommandTemplate::new(
            "PowerShell PUT",
            "Invoke-WebRequest -Uri {url} -Method PUT -InFile {file}",
        ),
        CommandTemplate::new(
            "PowerShell POST",
            "Invoke-WebRequest -Uri {url} -Method POST -InFile {file}",
        ),
    ]
}

/// 命令生成器
///
/// 只持有模板，不做任何 I/O。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFormatter {
    download: Vec<CommandTemplate>,
    upload: Vec<CommandTemplate>,
}

impl Default for CommandFormatter {
    fn default() -> Self {
        Self {
            download: default_download_templates(),
            upload: default_upload_templates(),
        }
    }
}

impl CommandFormatter {
    /// 使用自定义模板；任一列表为空时回退到默认模板
    pub fn new(download: Vec<CommandTemplate>, upload: Vec<CommandTemplate>) -> Self {
        Self {
            download: if download.is_empty() {
                default_download_templates()
            } else {
                download
            },
            upload: if upload.is_empty() {
                default_upload_templates()
            } else {
                upload
            },
        }
    }

    /// 下载命令
    ///
    /// `display_name` 是快照中的显示名；以 `uploads/` 开头时生成
    /// `/uploads/<name>` 路由。
    pub fn download_commands(&self, ip: &str, port: u16, display_name: &str) -> CommandSet {
        let path = download_path(display_name);
        let url = server_url(ip, port, &path);
        let file = local_name(&path);
        render_all(&self.download, url, file)
    }

    /// 针对快照条目生成下载命令
    pub fn download_commands_for(&self, ip: &str, port: u16, entry: &FileEntry) -> CommandSet {
        let path = entry.url_path();
        let url = server_url(ip, port, &path);
        render_all(&self.download, url, entry.file_name())
    }

    /// 上传命令：文件将保存到服务器的 `uploads/<filename>`
    pub fn upload_commands(&self, ip: &str, port: u16, filename: &str) -> CommandSet {
        let filename = filename.trim().trim_start_matches('/');
        let url = server_url(ip, port, filename);
        render_all(&self.upload, url, local_name(filename))
    }
}

fn render_all(templates: &[CommandTemplate], url: String, file: &str) -> CommandSet {
    let commands = templates.iter().map(|t| t.render(&url, file)).collect();
    CommandSet { url, commands }
}

fn download_path(display_name: &str) -> String {
    // 显示前缀 `uploads/` → 路由段 `/uploads/`
    match display_name.strip_prefix(UPLOADS_PREFIX) {
        Some(name) => format!("{UPLOADS_DIR_NAME}/{name}"),
        None => display_name.to_string(),
    }
}

fn server_url(ip: &str, port: u16, path: &str) -> String {
    let segments: Vec<Cow<'_, str>> = path.split('/').map(urlencoding::encode).collect();
    format!("http://{ip}:{port}/{}", segments.join("/"))
}

/// 命令行参数中的文件名；只含安全字符时原样输出
fn shell_word(file: &str) -> Cow<'_, str> {
    let safe = !file.is_empty()
        && file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-+@,:=".contains(c));
    if safe {
        Cow::Borrowed(file)
    } else {
        Cow::Owned(format!("\"{file}\""))
    }
}

fn local_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
