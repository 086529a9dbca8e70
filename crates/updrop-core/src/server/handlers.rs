//! 请求处理器
//!
//! - `GET`/`HEAD`: 流式返回文件
//! - `PUT`/`POST`: 把请求体流式写入临时文件，完成后重命名为 `uploads/<name>`

use log::{debug, info, warn};

use axum::{
    body::Body,
    extract::State,
    http::{Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ServeRoot;
use super::paths::{self, Scope};
use crate::error::ServeError;
use crate::snapshot::PARTIAL_SUFFIX;

/// 单一入口：按方法分发并记录访问日志
pub(super) async fn dispatch(
    State(root): State<Arc<ServeRoot>>,
    method: Method,
    uri: Uri,
    body: Body,
) -> Response {
    let request_id = Uuid::new_v4().simple().to_string();
    let request_id = &request_id[..8];
    let path = uri.path().to_string();
    debug!("[{}] {} {}", request_id, method, path);

    let result = match method {
        Method::GET => download(&root, &path, false).await,
        Method::HEAD => download(&root, &path, true).await,
        Method::PUT | Method::POST => upload(&root, &path, body, request_id).await,
        ref other => Err(ServeError::MethodNotAllowed(other.to_string())),
    };

    match result {
        Ok(resp) => resp,
        Err(e) => {
            match &e {
                ServeError::Traversal(_) | ServeError::Forbidden(_) => {
                    warn!("[{}] {} {} rejected: {}", request_id, method, path, e);
                }
                ServeError::NotFound(_) => {
                    info!("[{}] {} {} -> 404", request_id, method, path);
                }
                _ => warn!("[{}] {} {} failed: {}", request_id, method, path, e),
            }
            e.into_response()
        }
    }
}

async fn download(root: &ServeRoot, raw: &str, head_only: bool) -> Result<Response, ServeError> {
    let request = paths::parse(raw)?;
    let candidates: Vec<PathBuf> = match request.scope {
        Scope::Uploads => vec![root.uploads_dir.join(&request.relative)],
        Scope::Any => vec![
            root.base_dir.join(&request.relative),
            root.uploads_dir.join(&request.relative),
        ],
    };

    for candidate in candidates {
        let Ok(meta) = fs::metadata(&candidate).await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let resolved = root.contain(&candidate, raw).await?;
        let file = File::open(&resolved)
            .await
            .map_err(|e| ServeError::io(&resolved, e))?;
        // 长度取自已打开的文件：上传通过重命名替换，不会改变这个句柄的内容
        let len = file
            .metadata()
            .await
            .map_err(|e| ServeError::io(&resolved, e))?
            .len();

        let mime = mime_guess::from_path(&resolved).first_or_octet_stream();
        let body = if head_only {
            Body::empty()
        } else {
            let stream = tokio_util::io::ReaderStream::new(file)
                .take_until(root.abort.clone().cancelled_owned());
            Body::from_stream(stream)
        };

        let verb = if head_only { "HEAD" } else { "GET" };
        info!("{} {} -> 200 ({} bytes)", verb, raw, len);
        return Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime.to_string()),
                (header::CONTENT_LENGTH, len.to_string()),
            ],
            body,
        )
            .into_response());
    }

    Err(ServeError::NotFound(raw.to_string()))
}

async fn upload(
    root: &ServeRoot,
    raw: &str,
    body: Body,
    request_id: &str,
) -> Result<Response, ServeError> {
    let request = paths::parse(raw)?;
    let name = request.upload_name()?;
    if name.ends_with(PARTIAL_SUFFIX) {
        return Err(ServeError::Traversal(format!("reserved upload name {name}")));
    }
    let target = root.uploads_dir.join(name);

    fs::create_dir_all(&root.uploads_dir)
        .await
        .map_err(|e| ServeError::io(&root.uploads_dir, e))?;

    // 已存在的符号链接会把写入带出 uploads/
    let existed = match fs::symlink_metadata(&target).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            return Err(ServeError::Forbidden(raw.to_string()));
        }
        Ok(_) => true,
        Err(_) => false,
    };

    // 先写临时文件再重命名：失败时旧文件保持不变，读者看不到写了一半的内容
    let partial = root
        .uploads_dir
        .join(format!(".{name}.{request_id}{PARTIAL_SUFFIX}"));
    let result = match write_body(&partial, body, &root.abort).await {
        Ok(n) => fs::rename(&partial, &target)
            .await
            .map(|()| n)
            .map_err(|e| ServeError::io(&target, e)),
        Err(e) => Err(e),
    };
    let written = match result {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_file(&partial).await;
            return Err(e);
        }
    };

    let status = if existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    info!(
        "Saved uploads/{} ({} bytes) -> {}",
        name,
        written,
        status.as_u16()
    );
    Ok((status, format!("Saved uploads/{name} ({written} bytes)\n")).into_response())
}

async fn write_body(
    target: &Path,
    body: Body,
    abort: &CancellationToken,
) -> Result<u64, ServeError> {
    let mut file = File::create(target)
        .await
        .map_err(|e| ServeError::io(target, e))?;
    let mut stream = body.into_data_stream();
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            () = abort.cancelled() => return Err(ServeError::ShuttingDown),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| ServeError::Body(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| ServeError::io(target, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| ServeError::io(target, e))?;
    Ok(written)
}
