//! TUI 日志层
//!
//! 自定义 tracing Layer，把服务器访问日志等事件转发到仪表盘的活动面板。
//! `updrop-core` 通过 `log` 门面输出，经 `LogTracer` 转成 tracing 事件后到这里，
//! 所以级别和 target 取自规范化后的元数据。

use crate::app::AppEvent;
use std::fmt::{self, Write as _};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_log::{AsLog, NormalizeEvent};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use updrop_core::LogLevel;

pub struct TuiLogLayer {
    tx: mpsc::Sender<AppEvent>,
}

impl TuiLogLayer {
    pub fn new(tx: mpsc::Sender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for TuiLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        let level = LogLevel::from(metadata.level().as_log());

        let mut visitor = PanelVisitor::default();
        event.record(&mut visitor);
        let message = visitor.finish(metadata.target());

        // 面板积压时丢弃，不能阻塞服务器任务
        let _ = self.tx.try_send(AppEvent::LogMessage { level, message });
    }
}

/// 拼出面板里的一行：`message` 在前，其余字段以 `k=v` 追加
#[derive(Default)]
struct PanelVisitor {
    message: String,
    fields: String,
}

impl PanelVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        // log 桥接带来的 log.target / log.file 等字段不显示
        if name.starts_with("log.") {
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn finish(self, target: &str) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (true, true) => target.to_string(),
            (true, false) => self.fields,
            (false, true) => self.message,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for PanelVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(emit: impl FnOnce()) -> Vec<(LogLevel, String)> {
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry().with(TuiLogLayer::new(tx));
        tracing::subscriber::with_default(subscriber, emit);

        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::LogMessage { level, message } => out.push((level, message)),
                other => panic!("unexpected event {other:?}"),
            }
        }
        out
    }

    #[test]
    fn test_events_reach_channel() {
        let lines = capture(|| tracing::warn!("GET /../etc/passwd rejected"));
        assert_eq!(
            lines,
            vec![(LogLevel::Warn, "GET /../etc/passwd rejected".to_string())]
        );
    }

    #[test]
    fn test_fields_follow_message() {
        let lines = capture(|| {
            tracing::error!(port = 8000, "bind failed");
            tracing::debug!(path = "uploads/a.bin");
        });
        assert_eq!(
            lines,
            vec![
                (LogLevel::Error, "bind failed port=8000".to_string()),
                (LogLevel::Debug, "path=uploads/a.bin".to_string()),
            ]
        );
    }

    #[test]
    fn test_log_records_are_normalized() {
        let lines = capture(|| {
            tracing_log::format_trace(
                &log::Record::builder()
                    .args(format_args!("PUT /loot.zip 201"))
                    .level(log::Level::Info)
                    .target("updrop_core::server")
                    .build(),
            )
            .unwrap();
        });
        assert_eq!(lines, vec![(LogLevel::Info, "PUT /loot.zip 201".to_string())]);
    }

    #[test]
    fn test_full_channel_does_not_block() {
        let (tx, _rx) = mpsc::channel(1);
        let subscriber = tracing_subscriber::registry().with(TuiLogLayer::new(tx));
        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::info!("line {}", i);
            }
        });
    }
}
