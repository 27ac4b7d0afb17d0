//! Fileshare Core Library
//!
//! 个人文件共享系统的核心实现：单机 HTTP 文件服务器、客户端库，
//! 以及把本地服务暴露到公网的隧道进程管理。
//!
//! # 模块
//!
//! - **catalog**: SQLite 文件目录，文件名全局唯一
//! - **server**: axum HTTP 服务器 (`/`, `/files`, `/upload`, `/download/:filename`)
//! - **client**: reqwest 客户端库，持有服务器地址配置
//! - **settings**: 客户端服务器地址的持久化 (JSON)
//! - **tunnel**: 外部隧道进程 (ngrok) 的启动/就绪轮询/停止状态机
//! - **logging**: 跨 UI 共享的日志级别和条目
//!
//! # 使用示例
//!
//! ## 启动服务器
//!
//! ```ignore
//! use fileshare_core::{FileServer, ServerConfig};
//!
//! let server = FileServer::new(ServerConfig::default())?;
//! let addr = server.start().await?;
//! ```
//!
//! ## 上传和下载
//!
//! ```ignore
//! use fileshare_core::{FileShareClient, JsonSettingsFile};
//! use std::sync::Arc;
//!
//! let client = FileShareClient::from_settings(Arc::new(JsonSettingsFile::default()))?;
//! client.upload_file(Path::new("report.pdf")).await?;
//! for name in client.list_files().await? {
//!     println!("{name}");
//! }
//! client.download_file("report.pdf", Path::new("/tmp/report.pdf")).await?;
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod logging;
pub mod server;
pub mod settings;
pub mod tunnel;

/// 服务器默认端口
pub const DEFAULT_PORT: u16 = 5000;

pub use catalog::{Catalog, CatalogError, FileRecord};
pub use client::{
    ClientConfig, ClientError, FileShareClient, ProbeOutcome, RequestTimeouts,
    normalize_server_url,
};
pub use config::ServerConfig;
pub use logging::{LogEntry, LogLevel};
pub use server::{ApiError, FileServer, StorageError, UploadDir};
pub use settings::{
    ClientSettings, DEFAULT_SERVER_URL, JsonSettingsFile, MemorySettings, SettingsError,
    SettingsStore,
};
pub use tunnel::{
    NgrokApiProbe, ReadinessProbe, TunnelConfig, TunnelError, TunnelHandle, TunnelState,
};
