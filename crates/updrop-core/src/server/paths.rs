//! 请求路径解析
//!
//! 所有来自网络的路径先经过这里：百分号解码，然后逐段校验。
//! 只接受普通路径段，`..`、`.`、空段、反斜杠和 NUL 一律拒绝，
//! 因此解析结果拼接到服务目录后不可能在词法上离开该目录。
//! 符号链接造成的逃逸由处理器在打开文件前检查。

use std::path::{Component, Path, PathBuf};

use crate::error::ServeError;
use crate::snapshot::UPLOADS_DIR_NAME;

/// 请求的查找范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// 先查服务目录，再查 `uploads/`
    Any,
    /// 显式的 `/uploads/<name>`，只查 `uploads/`
    Uploads,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    pub scope: Scope,
    pub relative: PathBuf,
}

impl RequestPath {
    /// 上传只允许单个文件名
    pub fn upload_name(&self) -> Result<&str, ServeError> {
        let mut components = self.relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => name
                .to_str()
                .ok_or_else(|| ServeError::Traversal(self.relative.display().to_string())),
            _ => Err(ServeError::Traversal(format!(
                "nested upload path {}",
                self.relative.display()
            ))),
        }
    }
}

/// 解析 URI 路径（形如 `/uploads/report.pdf`）
pub fn parse(raw: &str) -> Result<RequestPath, ServeError> {
    let trimmed = raw.strip_prefix('/').unwrap_or(raw);
    if trimmed.is_empty() {
        return Err(ServeError::NotFound("/".to_string()));
    }

    let decoded =
        urlencoding::decode(trimmed).map_err(|_| ServeError::Traversal(raw.to_string()))?;
    if decoded.contains('\0') || decoded.contains('\\') {
        return Err(ServeError::Traversal(raw.to_string()));
    }

    let segments: Vec<&str> = decoded.split('/').collect();
    if segments.iter().any(|s| !is_normal_segment(s)) {
        return Err(ServeError::Traversal(raw.to_string()));
    }

    let (scope, rest) = match segments.split_first() {
        Some((first, rest)) if *first == UPLOADS_DIR_NAME && !rest.is_empty() => {
            (Scope::Uploads, rest)
        }
        _ => (Scope::Any, segments.as_slice()),
    };

    Ok(RequestPath {
        scope,
        relative: rest.iter().collect(),
    })
}

fn is_normal_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
