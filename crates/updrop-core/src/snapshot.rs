//! 目录快照
//!
//! 读取服务目录及其 `uploads/` 子目录中的文件元数据，生成一次性的有序列表。
//!
//! # 过滤策略
//!
//! 除了 `uploads` 目录项本身之外不排除任何文件（包括隐藏文件）。
//! 子目录不是文件，因此不会出现在列表中。名称不是合法 UTF-8 的文件无法通过
//! HTTP 路由寻址，同样被跳过。
//!
//! `uploads/` 中尚未写完的临时文件（[`PARTIAL_SUFFIX`]）不列出。
//!
//! 快照与正在运行的服务器并发读取同一目录：单个条目在列出和 stat 之间消失时
//! 只跳过该条目，不让整个快照失败。

use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::SnapshotError;

/// 上传子目录名称
pub const UPLOADS_DIR_NAME: &str = "uploads";

/// 上传文件在列表中的显示前缀
pub const UPLOADS_PREFIX: &str = "uploads/";

/// 正在写入的上传临时文件后缀；完成后重命名为最终文件名
pub const PARTIAL_SUFFIX: &str = ".updrop-partial";

/// 文件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// 直接位于服务目录
    Base,
    /// 位于 `uploads/` 子目录
    Uploaded,
}

/// 快照中的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub display_name: String,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: SystemTime,
    pub origin: Origin,
}

impl FileEntry {
    /// 不带显示前缀的文件名
    pub fn file_name(&self) -> &str {
        match self.origin {
            Origin::Uploaded => self
                .display_name
                .strip_prefix(UPLOADS_PREFIX)
                .unwrap_or(&self.display_name),
            Origin::Base => &self.display_name,
        }
    }

    /// 该文件在服务器上的 URL 路径（不含开头的 `/`）
    pub fn url_path(&self) -> String {
        match self.origin {
            Origin::Uploaded => format!("{UPLOADS_DIR_NAME}/{}", self.file_name()),
            Origin::Base => self.file_name().to_string(),
        }
    }
}

/// 某一时刻的目录列表，按 `display_name` 升序排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    entries: Vec<FileEntry>,
}

impl DirectorySnapshot {
    pub fn new(mut entries: Vec<FileEntry>) -> Self {
        entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Self { entries }
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }
}

impl<'a> IntoIterator for &'a DirectorySnapshot {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// 生成目录快照
///
/// `base_dir` 不可读时返回错误；`uploads_dir` 不存在时视为空。
pub fn snapshot(base_dir: &Path, uploads_dir: &Path) -> Result<DirectorySnapshot, SnapshotError> {
    let root = fs::canonicalize(base_dir).map_err(|source| SnapshotError::ReadDir {
        path: base_dir.to_path_buf(),
        source,
    })?;

    let mut entries = list_files(&root, base_dir, Origin::Base, Some(uploads_dir))?;

    match list_files(&root, uploads_dir, Origin::Uploaded, None) {
        Ok(mut uploaded) => entries.append(&mut uploaded),
        Err(e) => debug!("Skipping uploads listing: {}", e),
    }

    Ok(DirectorySnapshot::new(entries))
}

fn list_files(
    root: &Path,
    dir: &Path,
    origin: Origin,
    exclude: Option<&Path>,
) -> Result<Vec<FileEntry>, SnapshotError> {
    let read_dir = fs::read_dir(dir).map_err(|source| SnapshotError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let excluded_name = exclude.and_then(Path::file_name);
    let mut entries = Vec::new();

    for dir_entry in read_dir.flatten() {
        let os_name = dir_entry.file_name();
        if origin == Origin::Base && excluded_name == Some(os_name.as_os_str()) {
            continue;
        }
        let Some(name) = os_name.to_str() else {
            debug!("Skipping non UTF-8 name {:?}", os_name);
            continue;
        };
        if origin == Origin::Uploaded && name.ends_with(PARTIAL_SUFFIX) {
            continue;
        }

        let path = dir_entry.path();
        // fs::metadata 跟随符号链接；文件在此期间被删除则跳过
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let Ok(resolved) = fs::canonicalize(&path) else {
            continue;
        };
        if !resolved.starts_with(root) {
            debug!("Skipping {} (resolves outside served directory)", name);
            continue;
        }

        let display_name = match origin {
            Origin::Base => name.to_string(),
            Origin::Uploaded => format!("{UPLOADS_PREFIX}{name}"),
        };

        entries.push(FileEntry {
            display_name,
            absolute_path: resolved,
            size_bytes: meta.len(),
            modified_at: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            origin,
        });
    }

    Ok(entries)
}
