//! 显示格式化

use chrono::{DateTime, Local};
use std::time::SystemTime;

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 人类可读的文件大小，例如 `1.5KB`
#[allow(clippy::cast_precision_loss)]
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1}{unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1}PB")
}

/// 本地时间 `YYYY-MM-DD HH:MM`
pub fn local_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0.0B");
        assert_eq!(human_size(1023), "1023.0B");
        assert_eq!(human_size(1536), "1.5KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0MB");
        assert_eq!(human_size(u64::MAX), "16384.0PB");
    }

    #[test]
    fn test_local_time_shape() {
        let s = local_time(SystemTime::now());
        assert_eq!(s.len(), 16);
        assert_eq!(&s[4..5], "-");
        assert_eq!(&s[13..14], ":");
    }
}
