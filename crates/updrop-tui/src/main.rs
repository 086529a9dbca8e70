//! Updrop - 临时文件交换点
//!
//! 在指定端口上提供目录的 HTTP 上传/下载，并用 ratatui 仪表盘显示文件列表
//! 和可直接复制的客户端下载/上传命令。
//!
//! # 日志
//!
//! 访问日志默认显示在仪表盘的活动面板中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p updrop-tui -- 8000 ./share 2>> /tmp/updrop.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    cursor,
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::prelude::*;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use app::{Action, App, AppEvent, DigestKey};
use tui_log::TuiLogLayer;
use updrop_core::{
    DirectorySnapshot, FileServer, PLACEHOLDER_IP, ServerConfig, Settings, SnapshotError,
};

#[derive(Parser, Debug)]
#[command(name = "updrop", version, about = "Serve a directory over HTTP with a live terminal dashboard")]
struct Cli {
    /// 监听端口
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// 服务目录
    #[arg(default_value = ".")]
    path: PathBuf,

    /// 命令中显示的地址（默认检测网卡地址）
    #[arg(long)]
    ip: Option<String>,

    /// 监听地址
    #[arg(long)]
    bind: Option<IpAddr>,

    /// 用于检测地址的网卡（覆盖设置文件）
    #[arg(short, long)]
    interface: Option<String>,

    /// 刷新间隔（毫秒）
    #[arg(long)]
    refresh_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 日志通道（服务器访问日志 → 活动面板）
    let (event_tx, event_rx) = mpsc::channel(256);
    init_logging(event_tx.clone());

    let mut settings = Settings::load();
    if let Some(interface) = cli.interface {
        settings.interface = interface;
    }
    if let Some(ms) = cli.refresh_ms {
        settings.refresh_interval_ms = ms;
    }

    let advertise_ip = cli
        .ip
        .or_else(|| updrop_core::net::interface_ipv4(&settings.interface))
        .unwrap_or_else(|| PLACEHOLDER_IP.to_string());

    // 目录和端口问题必须在进入 UI 之前报告
    let config = ServerConfig::prepare(&cli.path, cli.port, cli.bind, advertise_ip)
        .with_context(|| format!("cannot serve {}", cli.path.display()))?;
    let server = FileServer::bind(&config)
        .await
        .context("failed to start HTTP server")?;
    tracing::info!(
        "Serving {} on {} (uploads → {})",
        config.base_dir.display(),
        server.local_addr(),
        config.uploads_dir.display()
    );
    if config.advertise_ip == PLACEHOLDER_IP {
        tracing::warn!(
            "No IPv4 address on {}; commands use {PLACEHOLDER_IP} (pass --ip)",
            settings.interface
        );
    }

    // Ctrl-C 和 SIGTERM 都走正常退出流程
    let quit = CancellationToken::new();
    let signal = termination_signal().context("failed to install signal handlers")?;
    tokio::spawn({
        let quit = quit.clone();
        async move {
            signal.await;
            tracing::info!("Termination signal received, shutting down");
            quit.cancel();
        }
    });

    let handle = server.spawn(CancellationToken::new());

    let mut app = App::new(
        config.advertise_ip.clone(),
        config.port,
        config.base_dir.clone(),
        settings.formatter(),
    );
    app.hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Setup terminal
    install_panic_hook();
    let guard = TerminalGuard;
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    // Run app
    let snapshots = SnapshotRunner::for_config(&config, settings.snapshot_timeout());
    let res = run_app(&mut terminal, app, snapshots, &settings, &quit, event_tx, event_rx).await;

    drop(guard);
    handle.shutdown(settings.shutdown_grace()).await;
    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到仪表盘活动面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: mpsc::Sender<AppEvent>) {
    // updrop-core 只用 log 门面
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,updrop_core=debug"));
    let stderr_layer = std::env::var_os("RUST_LOG").map(|_| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact()
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(TuiLogLayer::new(log_tx))
        .with(stderr_layer)
        .try_init();
}

/// 离开备用屏幕、关闭 raw mode 并显示光标
fn restore_terminal(out: &mut impl io::Write) -> io::Result<()> {
    let raw = disable_raw_mode();
    execute!(out, LeaveAlternateScreen, cursor::Show)?;
    raw
}

/// 作用域结束（包括 `?` 提前返回）时恢复终端
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = restore_terminal(&mut io::stdout());
    }
}

/// panic 时先恢复终端，否则错误信息会被备用屏幕吞掉
fn install_panic_hook() {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal(&mut io::stdout());
        original(info);
    }));
}

/// 等待 Ctrl-C 或 SIGTERM
///
/// 信号处理在调用时就注册好，返回的 future 只负责等待。
#[cfg(unix)]
fn termination_signal() -> io::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn termination_signal() -> io::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    mut snapshots: SnapshotRunner,
    settings: &Settings,
    quit: &CancellationToken,
    event_tx: mpsc::Sender<AppEvent>,
    mut event_rx: mpsc::Receiver<AppEvent>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(settings.refresh_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events = EventStream::new();

    while app.is_running() {
        if let Some(key) = app.digest_request() {
            spawn_digest(key, event_tx.clone());
        }
        terminal.draw(|f| ui::draw(f, &app))?;

        tokio::select! {
            _ = ticker.tick() => {
                app.apply_snapshot(snapshots.refresh().await);
            }
            Some(event) = event_rx.recv() => {
                app.handle_event(event);
            }
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key) == Action::Refresh {
                        app.apply_snapshot(snapshots.refresh().await);
                        ticker.reset();
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e).context("terminal input error"),
                None => app.quit(),
            },
            _ = quit.cancelled() => {
                app.quit();
            }
        }
    }

    Ok(())
}

type SnapshotJob = Arc<dyn Fn() -> Result<DirectorySnapshot, SnapshotError> + Send + Sync>;

/// 在阻塞线程池中遍历目录，超时则保留旧列表
///
/// 超时的遍历不会被取消（阻塞线程无法中断），所以它被记下来，
/// 下一次刷新继续等待它而不是再开一个线程。
struct SnapshotRunner {
    job: SnapshotJob,
    timeout: Duration,
    in_flight: Option<JoinHandle<Result<DirectorySnapshot, SnapshotError>>>,
}

impl SnapshotRunner {
    fn new<F>(job: F, timeout: Duration) -> Self
    where
        F: Fn() -> Result<DirectorySnapshot, SnapshotError> + Send + Sync + 'static,
    {
        Self {
            job: Arc::new(job),
            timeout,
            in_flight: None,
        }
    }

    fn for_config(config: &ServerConfig, timeout: Duration) -> Self {
        let base = config.base_dir.clone();
        let uploads = config.uploads_dir.clone();
        Self::new(move || updrop_core::snapshot(&base, &uploads), timeout)
    }

    async fn refresh(&mut self) -> Result<DirectorySnapshot, SnapshotError> {
        let mut task = match self.in_flight.take() {
            Some(task) => task,
            None => {
                let job = Arc::clone(&self.job);
                tokio::task::spawn_blocking(move || job())
            }
        };

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SnapshotError::Task(join_err.to_string())),
            Err(_) => {
                self.in_flight = Some(task);
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                Err(SnapshotError::Timeout(timeout_ms))
            }
        }
    }
}

fn spawn_digest(key: DigestKey, tx: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let path = key.path.clone();
        let result = tokio::task::spawn_blocking(move || updrop_core::digest::sha256_file(&path))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));
        let _ = tx.send(AppEvent::Digest { key, result }).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["updrop", "8000"]).unwrap();
        assert_eq!(cli.port, 8000);
        assert_eq!(cli.path, PathBuf::from("."));
        assert!(cli.ip.is_none());

        let cli = Cli::try_parse_from([
            "updrop",
            "9001",
            "/srv/share",
            "--ip",
            "10.10.14.5",
            "--bind",
            "127.0.0.1",
            "-i",
            "eth0",
        ])
        .unwrap();
        assert_eq!(cli.path, PathBuf::from("/srv/share"));
        assert_eq!(cli.ip.as_deref(), Some("10.10.14.5"));
        assert_eq!(cli.bind, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(cli.interface.as_deref(), Some("eth0"));
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["updrop"]).is_err());
        assert!(Cli::try_parse_from(["updrop", "0"]).is_err());
        assert!(Cli::try_parse_from(["updrop", "70000"]).is_err());
        assert!(Cli::try_parse_from(["updrop", "http"]).is_err());
    }

    #[tokio::test]
    async fn test_snapshot_runner_lists_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::prepare(dir.path(), 8000, None, "1.2.3.4").unwrap();
        std::fs::write(config.uploads_dir.join("a.txt"), b"a").unwrap();

        let mut runner = SnapshotRunner::for_config(&config, Duration::from_secs(2));
        let snap = runner.refresh().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(0).unwrap().display_name, "uploads/a.txt");
    }

    #[tokio::test]
    async fn test_timed_out_snapshot_is_awaited_not_respawned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut runner = SnapshotRunner::new(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    std::thread::sleep(Duration::from_millis(300));
                }
                Ok(DirectorySnapshot::default())
            },
            Duration::from_millis(50),
        );

        assert!(matches!(runner.refresh().await, Err(SnapshotError::Timeout(50))));
        assert!(matches!(runner.refresh().await, Err(SnapshotError::Timeout(50))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 慢遍历结束后先交付它的结果，之后才开新的遍历
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(runner.refresh().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(runner.refresh().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_snapshot_is_reported() {
        let mut runner = SnapshotRunner::new(
            || panic!("walk exploded"),
            Duration::from_secs(2),
        );
        assert!(matches!(runner.refresh().await, Err(SnapshotError::Task(_))));
        // 失败的任务不会被保留
        assert!(runner.in_flight.is_none());
    }

    #[test]
    fn test_restore_terminal_leaves_alternate_screen() {
        let mut out = Vec::new();
        restore_terminal(&mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("\x1b[?1049l"), "{out:?}");
        assert!(out.contains("\x1b[?25h"), "{out:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_is_observed() {
        let signal = termination_signal().unwrap();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        tokio::time::timeout(Duration::from_secs(2), signal)
            .await
            .expect("SIGTERM not observed");
    }

    #[tokio::test]
    async fn test_spawn_digest_reports_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").unwrap();
        let key = DigestKey {
            path,
            size: 3,
            modified: std::time::SystemTime::UNIX_EPOCH,
        };

        let (tx, mut rx) = mpsc::channel(1);
        spawn_digest(key.clone(), tx);
        match rx.recv().await.unwrap() {
            AppEvent::Digest { key: got, result } => {
                assert_eq!(got, key);
                assert_eq!(
                    result.unwrap(),
                    "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
                );
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    /// 空目录启动 → 上传 → 下一次刷新后出现在列表中，下载命令指向 `/uploads/`
    #[tokio::test]
    async fn test_upload_appears_on_next_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::prepare(
            dir.path(),
            0,
            Some("127.0.0.1".parse().unwrap()),
            "10.10.14.5",
        )
        .unwrap();
        let server = FileServer::bind(&config).await.unwrap();
        let addr = server.local_addr();
        let handle = server.spawn(CancellationToken::new());

        let mut app = App::new("10.10.14.5", 8000, config.base_dir.clone(), Default::default());
        let mut runner = SnapshotRunner::for_config(&config, Duration::from_secs(2));
        app.apply_snapshot(runner.refresh().await);
        assert!(app.snapshot.is_empty());
        assert_eq!(app.selection, None);

        let resp = reqwest::Client::new()
            .put(format!("http://{addr}/report.pdf"))
            .body(vec![7u8; 1234])
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);

        app.apply_snapshot(runner.refresh().await);
        let entry = app.selected_entry().unwrap();
        assert_eq!(entry.display_name, "uploads/report.pdf");
        assert_eq!(entry.size_bytes, 1234);

        let set = app.command_set().unwrap();
        assert!(set.url.contains("http://10.10.14.5:8000/uploads/report.pdf"));

        handle.shutdown(Duration::from_secs(1)).await;
    }
}
