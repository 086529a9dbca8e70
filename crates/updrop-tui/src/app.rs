//! Application state
//!
//! 仪表盘状态机：`Loading → Browsing ⇄ TypingUploadName → Exited`。
//! 所有状态变化都在这里完成，I/O（快照、摘要计算）由主循环执行后把结果交回。

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;
use std::time::SystemTime;

use updrop_core::{
    CommandFormatter, CommandSet, DirectorySnapshot, FileEntry, LogBuffer, LogEntry, LogLevel,
    SnapshotError,
};

const LOG_CAPACITY: usize = 200;

/// 后台任务发给 UI 的事件
#[derive(Debug)]
pub enum AppEvent {
    LogMessage {
        level: LogLevel,
        message: String,
    },
    Digest {
        key: DigestKey,
        result: Result<String, String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Loading,
    Browsing,
    TypingUploadName(String),
    Exited,
}

/// 命令面板当前显示的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandView {
    Download,
    Upload(String),
}

/// 按键处理后需要主循环执行的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Refresh,
}

/// 摘要缓存键：路径、大小和修改时间都相同才视为同一内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestKey {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl DigestKey {
    fn of(entry: &FileEntry) -> Self {
        Self {
            path: entry.absolute_path.clone(),
            size: entry.size_bytes,
            modified: entry.modified_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestState {
    Pending(DigestKey),
    Ready(DigestKey, String),
    Failed(DigestKey, String),
}

impl DigestState {
    fn key(&self) -> &DigestKey {
        match self {
            DigestState::Pending(k) | DigestState::Ready(k, _) | DigestState::Failed(k, _) => k,
        }
    }
}

pub struct App {
    pub mode: Mode,
    pub view: CommandView,
    pub snapshot: DirectorySnapshot,
    pub selection: Option<usize>,
    /// 最近一次刷新失败的原因；成功刷新后清除
    pub banner: Option<String>,
    pub logs: LogBuffer,
    pub digest: Option<DigestState>,
    pub advertise_ip: String,
    pub port: u16,
    pub base_dir: PathBuf,
    pub hostname: String,
    formatter: CommandFormatter,
}

impl App {
    pub fn new(
        advertise_ip: impl Into<String>,
        port: u16,
        base_dir: PathBuf,
        formatter: CommandFormatter,
    ) -> Self {
        let mut logs = LogBuffer::new(LOG_CAPACITY);
        logs.push(LogEntry::new(
            LogLevel::Info,
            "↑/↓ select, 'u' upload commands, 'r' refresh, 'q' quit",
        ));

        Self {
            mode: Mode::Loading,
            view: CommandView::Download,
            snapshot: DirectorySnapshot::default(),
            selection: None,
            banner: None,
            logs,
            digest: None,
            advertise_ip: advertise_ip.into(),
            port,
            base_dir,
            hostname: String::new(),
            formatter,
        }
    }

    pub fn is_running(&self) -> bool {
        self.mode != Mode::Exited
    }

    pub fn quit(&mut self) {
        self.mode = Mode::Exited;
    }

    /// 应用一次刷新的结果
    ///
    /// 失败时保留上一份快照，只显示错误横幅。
    pub fn apply_snapshot(&mut self, result: Result<DirectorySnapshot, SnapshotError>) {
        match result {
            Ok(snapshot) => {
                self.selection = clamp_selection(self.selection, snapshot.len());
                self.snapshot = snapshot;
                self.banner = None;
            }
            Err(e) => {
                self.banner = Some(e.to_string());
            }
        }
        if self.mode == Mode::Loading {
            self.mode = Mode::Browsing;
        }
    }

    pub fn selected_entry(&self) -> Option<&FileEntry> {
        self.selection.and_then(|i| self.snapshot.get(i))
    }

    pub fn next_file(&mut self) {
        if let Some(i) = self.selection {
            self.selection = Some((i + 1).min(self.snapshot.len().saturating_sub(1)));
        }
        self.view = CommandView::Download;
    }

    pub fn previous_file(&mut self) {
        if let Some(i) = self.selection {
            self.selection = Some(i.saturating_sub(1));
        }
        self.view = CommandView::Download;
    }

    /// 当前命令面板内容
    pub fn command_set(&self) -> Option<CommandSet> {
        match &self.view {
            CommandView::Upload(name) => Some(self.formatter.upload_commands(
                &self.advertise_ip,
                self.port,
                name,
            )),
            CommandView::Download => self.selected_entry().map(|entry| {
                self.formatter
                    .download_commands_for(&self.advertise_ip, self.port, entry)
            }),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit();
            return Action::None;
        }

        match &mut self.mode {
            Mode::TypingUploadName(buffer) => match key.code {
                KeyCode::Esc => {
                    self.mode = Mode::Browsing;
                    self.view = CommandView::Download;
                }
                KeyCode::Enter => {
                    let name = buffer.trim().to_string();
                    self.mode = Mode::Browsing;
                    if name.is_empty() {
                        self.view = CommandView::Download;
                    } else {
                        self.add_log(LogLevel::Info, format!("Upload commands for {name}"));
                        self.view = CommandView::Upload(name);
                    }
                }
                KeyCode::Backspace => {
                    buffer.pop();
                }
                KeyCode::Char(c) => buffer.push(c),
                _ => {}
            },
            Mode::Browsing => match key.code {
                KeyCode::Char('q') => self.quit(),
                KeyCode::Char('r') => {
                    self.view = CommandView::Download;
                    return Action::Refresh;
                }
                KeyCode::Char('u') => self.mode = Mode::TypingUploadName(String::new()),
                KeyCode::Esc => self.view = CommandView::Download,
                KeyCode::Up | KeyCode::Char('k') => self.previous_file(),
                KeyCode::Down | KeyCode::Char('j') => self.next_file(),
                _ => {}
            },
            // 首次快照完成前只响应退出
            Mode::Loading => {
                if key.code == KeyCode::Char('q') {
                    self.quit();
                }
            }
            Mode::Exited => {}
        }
        Action::None
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::LogMessage { level, message } => self.add_log(level, message),
            AppEvent::Digest { key, result } => {
                // 选择已经变化时丢弃过期结果
                if self.digest.as_ref().map(DigestState::key) != Some(&key) {
                    return;
                }
                self.digest = Some(match result {
                    Ok(hex) => DigestState::Ready(key, hex),
                    Err(e) => DigestState::Failed(key, e),
                });
            }
        }
    }

    /// 如果选中文件的摘要尚未计算，返回需要计算的键并标记为进行中
    pub fn digest_request(&mut self) -> Option<DigestKey> {
        let key = DigestKey::of(self.selected_entry()?);
        if self.digest.as_ref().map(DigestState::key) == Some(&key) {
            return None;
        }
        self.digest = Some(DigestState::Pending(key.clone()));
        Some(key)
    }

    /// 当前选中文件的摘要（仅当与选中文件匹配时）
    pub fn current_digest(&self) -> Option<&DigestState> {
        let key = DigestKey::of(self.selected_entry()?);
        self.digest.as_ref().filter(|d| d.key() == &key)
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
    }
}

/// 新快照到达后重新约束选择位置
pub fn clamp_selection(selection: Option<usize>, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(selection.unwrap_or(0).min(len - 1))
    }
}
