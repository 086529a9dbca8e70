//! 网卡地址检测
//!
//! 通过 `ip -4 addr show <iface>` 获取网卡上的第一个 IPv4 地址，
//! 用于生成客户端命令（例如 VPN 的 `tun0`）。

use log::debug;
use regex::Regex;
use std::process::Command;
use std::sync::LazyLock;

static INET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"inet\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").expect("valid inet regex")
});

/// 获取网卡的 IPv4 地址，失败时返回 `None`
pub fn interface_ipv4(interface: &str) -> Option<String> {
    let output = match Command::new("ip")
        .args(["-4", "addr", "show", interface])
        .output()
    {
        Ok(output) if output.status.success() => output,
        Ok(output) => {
            debug!(
                "`ip addr show {}` exited with {}",
                interface, output.status
            );
            return None;
        }
        Err(e) => {
            debug!("Failed to run `ip`: {}", e);
            return None;
        }
    };

    parse_inet(&String::from_utf8_lossy(&output.stdout))
}

/// 从 `ip addr` 输出中提取第一个 IPv4 地址
pub fn parse_inet(output: &str) -> Option<String> {
    INET_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
