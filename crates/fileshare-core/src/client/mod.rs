//! 文件服务器客户端
//!
//! 供 CLI 和 TUI 使用的 HTTP 客户端。
//!
//! # 功能
//!
//! - 探测服务器是否在线 (`GET /`)
//! - 列出、下载、上传文件
//! - 读取和修改服务器地址，修改后通过 [`SettingsStore`] 持久化
//!
//! 探测和列表请求使用总超时；下载和上传使用空闲超时，只要数据还在流动就不会中断。
//! 超时作为传输错误 [`ClientError::TimedOut`] 返回。

mod error;
mod url;

pub use error::ClientError;
pub use self::url::normalize_server_url;

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tokio_util::io::ReaderStream;

use crate::settings::{ClientSettings, SettingsStore};
use self::url::build_endpoint;

/// 各类请求的超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    /// TCP 连接建立
    pub connect: Duration,
    /// `GET /`
    pub probe: Duration,
    /// `GET /files`
    pub list: Duration,
    /// `GET /download/...`，等待响应头或两个数据块之间的最长间隔
    pub download: Duration,
    /// `POST /upload`，请求体停止发送后等待的最长时间
    pub upload: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            probe: Duration::from_secs(5),
            list: Duration::from_secs(10),
            download: Duration::from_secs(30),
            upload: Duration::from_secs(60),
        }
    }
}

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub timeouts: RequestTimeouts,
}

impl ClientConfig {
    pub fn new(server_url: &str) -> Self {
        Self {
            server_url: normalize_server_url(server_url),
            timeouts: RequestTimeouts::default(),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(&settings.server_url)
    }

    pub fn with_timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// 探测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 返回 200
    Reachable,
    /// 连接失败
    Unreachable(String),
    /// 超时
    TimedOut,
    /// 返回了非 200 状态码
    Status(u16),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Reachable => write!(f, "reachable"),
            ProbeOutcome::Unreachable(reason) => write!(f, "unreachable ({reason})"),
            ProbeOutcome::TimedOut => write!(f, "timed out"),
            ProbeOutcome::Status(code) => write!(f, "unexpected status {code}"),
        }
    }
}

/// 文件服务器客户端
///
/// 所有方法都接受 `&self`，可以放进 `Arc` 在多个任务之间共享。
pub struct FileShareClient {
    http: reqwest::Client,
    server_url: RwLock<String>,
    timeouts: RequestTimeouts,
    settings: Arc<dyn SettingsStore>,
}

impl FileShareClient {
    pub fn new(config: ClientConfig, settings: Arc<dyn SettingsStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .build()?;

        Ok(Self {
            http,
            server_url: RwLock::new(config.server_url),
            timeouts: config.timeouts,
            settings,
        })
    }

    /// 使用设置中保存的服务器地址创建客户端
    pub fn from_settings(settings: Arc<dyn SettingsStore>) -> Result<Self, ClientError> {
        let config = ClientConfig::from_settings(&settings.load());
        Self::new(config, settings)
    }

    /// 当前服务器地址
    pub fn server_url(&self) -> String {
        self.server_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 修改服务器地址并持久化，返回规范化后的地址
    ///
    /// 保存失败时内存中的地址保持不变。
    pub fn set_server_url(&self, url: &str) -> Result<String, ClientError> {
        let normalized = normalize_server_url(url);
        if normalized == "https://" {
            return Err(ClientError::InvalidUrl(url.to_string()));
        }

        self.settings.save(&ClientSettings {
            server_url: normalized.clone(),
        })?;
        *self
            .server_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = normalized.clone();

        info!("Server URL set to {}", normalized);
        Ok(normalized)
    }

    /// 探测服务器，`url` 为空时使用当前地址
    pub async fn probe(&self, url: Option<&str>) -> ProbeOutcome {
        let base = match url {
            Some(u) => normalize_server_url(u),
            None => self.server_url(),
        };
        let endpoint = match build_endpoint(&base, &[""]) {
            Ok(e) => e,
            Err(e) => return ProbeOutcome::Unreachable(e.to_string()),
        };

        debug!("Probing {}", endpoint);
        let result = self
            .http
            .get(endpoint)
            .timeout(self.timeouts.probe)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => ProbeOutcome::Reachable,
            Ok(resp) => ProbeOutcome::Status(resp.status().as_u16()),
            Err(e) => match ClientError::from(e) {
                ClientError::TimedOut => ProbeOutcome::TimedOut,
                other => ProbeOutcome::Unreachable(other.to_string()),
            },
        }
    }

    /// 服务器是否在线；任何错误都视为离线
    pub async fn test_connection(&self, url: Option<&str>) -> bool {
        let outcome = self.probe(url).await;
        if !outcome.is_reachable() {
            warn!("Connection test failed: {}", outcome);
        }
        outcome.is_reachable()
    }

    /// 列出服务器上的文件
    pub async fn list_files(&self) -> Result<Vec<String>, ClientError> {
        let endpoint = self.endpoint(&["files"])?;
        let resp = self
            .http
            .get(endpoint)
            .timeout(self.timeouts.list)
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let names: Vec<String> = resp.json().await?;
        debug!("Server has {} files", names.len());
        Ok(names)
    }

    /// 下载文件到 `destination`，返回写入的字节数
    pub async fn download_file(&self, filename: &str, destination: &Path) -> Result<u64, ClientError> {
        self.download_with_progress(filename, destination, |_, _| {})
            .await
    }

    /// 下载文件，每写入一块调用一次 `on_progress(已写入, 总大小)`
    ///
    /// 先检查状态码再创建目标文件，所以 404 不会留下空文件；
    /// 传输中途失败会删除已写入的部分。
    pub async fn download_with_progress<F>(
        &self,
        filename: &str,
        destination: &Path,
        mut on_progress: F,
    ) -> Result<u64, ClientError>
    where
        F: FnMut(u64, Option<u64>),
    {
        let endpoint = self.endpoint(&["download", filename])?;
        info!("Downloading {} to {:?}", filename, destination);

        let idle = self.timeouts.download;
        let resp = timeout(idle, self.http.get(endpoint).send()).await??;
        let resp = check_status(resp).await?;
        let total = resp.content_length();

        let mut file = File::create(destination).await?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;

        let result: Result<(), ClientError> = async {
            while let Some(chunk) = timeout(idle, stream.next()).await? {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                on_progress(written, total);
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(destination).await {
                warn!("Failed to remove partial download {:?}: {}", destination, rm);
            }
            return Err(e);
        }

        info!("Downloaded {} ({} bytes)", filename, written);
        Ok(written)
    }

    /// 上传文件，服务器端文件名为 `source` 的文件名部分
    pub async fn upload_file(&self, source: &Path) -> Result<(), ClientError> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidSource(source.to_path_buf()))?;
        self.upload_as(source, name).await
    }

    /// 以指定文件名上传
    pub async fn upload_as(&self, source: &Path, name: &str) -> Result<(), ClientError> {
        let meta = tokio::fs::metadata(source).await?;
        if !meta.is_file() {
            return Err(ClientError::InvalidSource(source.to_path_buf()));
        }

        let file = File::open(source).await?;
        let activity = Activity::new();
        let tracker = activity.clone();
        let stream = ReaderStream::new(file).inspect(move |_| tracker.touch());
        let body = reqwest::Body::wrap_stream(stream);
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        let part = Part::stream_with_length(body, meta.len())
            .file_name(name.to_string())
            .mime_str(mime.as_ref())?;
        // 文件名按原样发送，不做百分号编码
        let form = Form::new().percent_encode_noop().part("file", part);

        info!("Uploading {:?} as {} ({} bytes)", source, name, meta.len());

        let endpoint = self.endpoint(&["upload"])?;
        let send = self.http.post(endpoint).multipart(form).send();
        let resp = tokio::select! {
            resp = send => resp?,
            () = activity.idle_for(self.timeouts.upload) => return Err(ClientError::TimedOut),
        };
        check_status(resp).await?;

        info!("Uploaded {}", name);
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ClientError> {
        build_endpoint(&self.server_url(), segments)
    }
}

/// 传输活动记录，请求体每发出一块就更新一次
#[derive(Clone)]
struct Activity {
    start: Instant,
    last_ms: Arc<AtomicU64>,
}

impl Activity {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    fn touch(&self) {
        let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.store(elapsed, Ordering::Relaxed);
    }

    fn idle(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.start.elapsed().saturating_sub(last)
    }

    /// 连续 `limit` 时间没有活动后返回
    async fn idle_for(&self, limit: Duration) {
        loop {
            let idle = self.idle();
            if idle >= limit {
                return;
            }
            tokio::time::sleep(limit - idle).await;
        }
    }
}

/// 非 2xx 状态码转换为 `ClientError::Status`
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}
