//! Application state
//!
//! 所有网络操作都在独立的 tokio 任务中执行，结果通过 [`AppEvent`] 发回主循环。
//! 同一个操作的后续步骤（例如上传后刷新列表）在同一个任务里顺序执行。

use fileshare_core::{FileShareClient, LogEntry, LogLevel, TunnelHandle, TunnelState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// 日志面板保留的最大条数
const MAX_LOGS: usize = 500;

/// 后台任务发回主循环的事件
#[derive(Debug)]
pub enum AppEvent {
    Log(LogEntry),
    Connected { url: String, reachable: bool },
    FilesLoaded(Result<Vec<String>, String>),
    Uploaded { name: String, result: Result<(), String> },
    Downloaded { name: String, dest: PathBuf, result: Result<u64, String> },
    TunnelStarted(Result<String, String>),
    TunnelStopped(Result<(), String>),
    TaskFinished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Files,
    Log,
}

/// 底部输入框当前用途
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    EditUrl,
    UploadPath,
    DownloadPath { name: String },
}

pub struct App {
    pub client: Arc<FileShareClient>,
    pub tunnel: Arc<TunnelHandle>,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,

    pub tab: Tab,
    pub input_mode: InputMode,
    pub input_buffer: String,

    pub files: Vec<String>,
    pub selected_file: usize,

    pub logs: Vec<LogEntry>,
    pub min_log_level: LogLevel,
    pub status_message: String,
    /// 最近一次连接测试结果
    pub connected: Option<bool>,
    /// 正在运行的后台任务数
    pub busy: usize,

    pub download_dir: PathBuf,
    pub local_port: u16,
}

impl App {
    pub fn new(
        client: Arc<FileShareClient>,
        tunnel: Arc<TunnelHandle>,
        download_dir: PathBuf,
        local_port: u16,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let mut app = Self {
            client,
            tunnel,
            event_tx,
            event_rx,
            tab: Tab::Files,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            files: Vec::new(),
            selected_file: 0,
            logs: Vec::new(),
            min_log_level: LogLevel::Info,
            status_message: "就绪".to_string(),
            connected: None,
            busy: 0,
            download_dir,
            local_port,
        };
        app.add_log(LogLevel::Info, "Fileshare TUI 启动");
        app.add_log(
            LogLevel::Info,
            "按 'c' 连接服务器, 'l' 本地服务器, 'r' 刷新, 'u' 上传, 'd' 下载, 't' 隧道, 'q' 退出",
        );
        app
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.push_log(LogEntry::new(level, message));
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    /// 按当前过滤级别可见的日志
    pub fn visible_logs(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        let min = self.min_log_level;
        self.logs.iter().filter(move |e| e.level <= min)
    }

    pub fn toggle_log_level(&mut self) {
        self.min_log_level = match self.min_log_level {
            LogLevel::Info => LogLevel::Debug,
            _ => LogLevel::Info,
        };
        self.status_message = format!("日志级别: {}", self.min_log_level);
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Files => Tab::Log,
            Tab::Log => Tab::Files,
        };
    }

    pub fn next_file(&mut self) {
        if !self.files.is_empty() {
            self.selected_file = (self.selected_file + 1) % self.files.len();
        }
    }

    pub fn previous_file(&mut self) {
        if !self.files.is_empty() {
            self.selected_file = self
                .selected_file
                .checked_sub(1)
                .unwrap_or(self.files.len() - 1);
        }
    }

    pub fn selected_file_name(&self) -> Option<&str> {
        self.files.get(self.selected_file).map(String::as_str)
    }

    // ---- 输入框 ----

    pub fn begin_edit_url(&mut self) {
        self.input_buffer = self.client.server_url();
        self.input_mode = InputMode::EditUrl;
    }

    pub fn begin_upload(&mut self) {
        self.input_buffer.clear();
        self.input_mode = InputMode::UploadPath;
    }

    pub fn begin_download(&mut self) {
        let Some(name) = self.selected_file_name().map(str::to_string) else {
            self.add_log(LogLevel::Warn, "没有选中的文件");
            return;
        };
        self.input_buffer = default_download_path(&self.download_dir, &name)
            .to_string_lossy()
            .to_string();
        self.input_mode = InputMode::DownloadPath { name };
    }

    pub fn cancel_input(&mut self) {
        self.input_buffer.clear();
        self.input_mode = InputMode::Normal;
    }

    /// 提交输入框内容并启动对应操作
    pub fn submit_input(&mut self) {
        let value = self.input_buffer.trim().to_string();
        let mode = std::mem::replace(&mut self.input_mode, InputMode::Normal);
        self.input_buffer.clear();

        if value.is_empty() {
            return;
        }
        match mode {
            InputMode::Normal => {}
            InputMode::EditUrl => self.connect(value),
            InputMode::UploadPath => self.upload(PathBuf::from(value)),
            InputMode::DownloadPath { name } => self.download(name, PathBuf::from(value)),
        }
    }

    // ---- 后台操作 ----

    /// 测试连接，成功后保存地址并刷新文件列表
    pub fn connect(&mut self, url: String) {
        self.status_message = format!("正在连接 {}...", url);
        let client = self.client.clone();
        self.spawn(move |tx| async move {
            let reachable = client.test_connection(Some(&url)).await;
            let url = if reachable {
                match client.set_server_url(&url) {
                    Ok(saved) => saved,
                    Err(e) => {
                        let _ = tx
                            .send(AppEvent::Log(LogEntry::warn(format!(
                                "无法保存服务器地址: {}",
                                e
                            ))))
                            .await;
                        url
                    }
                }
            } else {
                url
            };
            let _ = tx.send(AppEvent::Connected { url, reachable }).await;
            if reachable {
                let result = client.list_files().await.map_err(|e| e.to_string());
                let _ = tx.send(AppEvent::FilesLoaded(result)).await;
            }
        });
    }

    pub fn use_local_server(&mut self) {
        self.connect(format!("http://localhost:{}", self.local_port));
    }

    pub fn refresh(&mut self) {
        self.status_message = "正在刷新文件列表...".to_string();
        let client = self.client.clone();
        self.spawn(move |tx| async move {
            let result = client.list_files().await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::FilesLoaded(result)).await;
        });
    }

    pub fn upload(&mut self, path: PathBuf) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.status_message = format!("正在上传 {}...", name);
        let client = self.client.clone();
        self.spawn(move |tx| async move {
            let result = client.upload_file(&path).await.map_err(|e| e.to_string());
            let ok = result.is_ok();
            let _ = tx.send(AppEvent::Uploaded { name, result }).await;
            if ok {
                let result = client.list_files().await.map_err(|e| e.to_string());
                let _ = tx.send(AppEvent::FilesLoaded(result)).await;
            }
        });
    }

    pub fn download(&mut self, name: String, dest: PathBuf) {
        self.status_message = format!("正在下载 {}...", name);
        let client = self.client.clone();
        self.spawn(move |tx| async move {
            let result = client
                .download_file(&name, &dest)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Downloaded { name, dest, result }).await;
        });
    }

    /// 启动或停止隧道
    pub fn toggle_tunnel(&mut self) {
        let tunnel = self.tunnel.clone();
        match tunnel.state() {
            TunnelState::Running { .. } => {
                self.status_message = "正在停止隧道...".to_string();
                self.spawn(move |tx| async move {
                    let result = tunnel.stop().await.map_err(|e| e.to_string());
                    let _ = tx.send(AppEvent::TunnelStopped(result)).await;
                });
            }
            TunnelState::Stopped => {
                self.status_message = "正在启动隧道...".to_string();
                let client = self.client.clone();
                self.spawn(move |tx| async move {
                    let result = tunnel.start().await.map_err(|e| e.to_string());
                    let public_url = result.as_ref().ok().cloned();
                    let _ = tx.send(AppEvent::TunnelStarted(result)).await;

                    // 隧道就绪后切换到公网地址
                    if let Some(url) = public_url {
                        let reachable = client.test_connection(Some(&url)).await;
                        let url = match client.set_server_url(&url) {
                            Ok(saved) => saved,
                            Err(_) => url,
                        };
                        let _ = tx.send(AppEvent::Connected { url, reachable }).await;
                        if reachable {
                            let result = client.list_files().await.map_err(|e| e.to_string());
                            let _ = tx.send(AppEvent::FilesLoaded(result)).await;
                        }
                    }
                });
            }
            other => {
                self.add_log(LogLevel::Warn, format!("隧道正在{}，请稍候", other));
            }
        }
    }

    fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(mpsc::Sender<AppEvent>) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.busy += 1;
        let tx = self.event_tx.clone();
        let fut = task(tx.clone());
        tokio::spawn(async move {
            fut.await;
            let _ = tx.send(AppEvent::TaskFinished).await;
        });
    }

    // ---- 事件处理 ----

    /// 处理所有已到达的后台事件
    pub fn tick(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(entry) => self.push_log(entry),
            AppEvent::Connected { url, reachable } => {
                self.connected = Some(reachable);
                if reachable {
                    self.status_message = format!("✅ 已连接 {}", url);
                    self.add_log(LogLevel::Info, format!("已连接到 {}", url));
                } else {
                    self.status_message = format!("❌ 无法连接 {}", url);
                    self.add_log(LogLevel::Error, format!("无法连接到 {}", url));
                }
            }
            AppEvent::FilesLoaded(Ok(files)) => {
                self.status_message = format!("共 {} 个文件", files.len());
                self.files = files;
                if self.selected_file >= self.files.len() {
                    self.selected_file = self.files.len().saturating_sub(1);
                }
            }
            AppEvent::FilesLoaded(Err(e)) => {
                self.status_message = "❌ 刷新失败".to_string();
                self.add_log(LogLevel::Error, format!("获取文件列表失败: {}", e));
            }
            AppEvent::Uploaded { name, result } => match result {
                Ok(()) => {
                    self.status_message = format!("✅ 已上传 {}", name);
                    self.add_log(LogLevel::Info, format!("上传完成: {}", name));
                }
                Err(e) => {
                    self.status_message = format!("❌ 上传失败 {}", name);
                    self.add_log(LogLevel::Error, format!("上传失败 {}: {}", name, e));
                }
            },
            AppEvent::Downloaded { name, dest, result } => match result {
                Ok(bytes) => {
                    self.status_message = format!("✅ 已下载 {}", name);
                    self.add_log(
                        LogLevel::Info,
                        format!("下载完成: {} → {} ({} bytes)", name, dest.display(), bytes),
                    );
                }
                Err(e) => {
                    self.status_message = format!("❌ 下载失败 {}", name);
                    self.add_log(LogLevel::Error, format!("下载失败 {}: {}", name, e));
                }
            },
            AppEvent::TunnelStarted(Ok(url)) => {
                self.status_message = format!("🌐 隧道已启动 {}", url);
                self.add_log(LogLevel::Info, format!("隧道公网地址: {}", url));
            }
            AppEvent::TunnelStarted(Err(e)) => {
                self.status_message = "❌ 隧道启动失败".to_string();
                self.add_log(LogLevel::Error, format!("隧道启动失败: {}", e));
            }
            AppEvent::TunnelStopped(Ok(())) => {
                self.status_message = "隧道已停止".to_string();
                self.add_log(LogLevel::Info, "隧道已停止");
            }
            AppEvent::TunnelStopped(Err(e)) => {
                self.add_log(LogLevel::Error, format!("停止隧道失败: {}", e));
            }
            AppEvent::TaskFinished => {
                self.busy = self.busy.saturating_sub(1);
            }
        }
    }
}

/// `<download_dir>/<name>`
pub fn default_download_path(download_dir: &Path, name: &str) -> PathBuf {
    let file_name = Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"));
    download_dir.join(file_name)
}
