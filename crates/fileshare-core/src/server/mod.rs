//! HTTP 文件服务器
//!
//! # 路由
//!
//! - `GET /` 存活检查
//! - `GET /files` 文件名 JSON 数组（目录插入顺序）
//! - `POST /upload` multipart 字段 `file`，成功返回 `201`
//! - `GET /download/:filename` 以附件形式返回文件内容，不存在返回 `404`
//!
//! 服务器独占上传目录和文件目录数据库，请求之间除目录外没有共享的可变状态。

mod error;
mod handlers;
pub mod storage;

pub use error::ApiError;
pub use storage::{StorageError, UploadDir};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use log::{error, info};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::catalog::Catalog;
use crate::config::ServerConfig;

/// 请求处理器共享的状态
pub(crate) struct AppState {
    pub(crate) catalog: Catalog,
    pub(crate) uploads: UploadDir,
}

/// 文件服务器
pub struct FileServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl FileServer {
    /// 创建上传目录并打开文件目录
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let uploads = UploadDir::create(&config.upload_dir)?;
        let catalog = Catalog::open(&config.database_path)?;

        info!(
            "Upload directory: {:?}, catalog: {:?}",
            uploads.root(),
            config.database_path
        );

        Ok(Self {
            config,
            state: Arc::new(AppState { catalog, uploads }),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.state.catalog
    }

    pub fn upload_dir(&self) -> &UploadDir {
        &self.state.uploads
    }

    /// 构建路由
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::index))
            .route("/files", get(handlers::list_files))
            .route("/upload", post(handlers::upload))
            .route("/download/:filename", get(handlers::download))
            .layer(DefaultBodyLimit::max(self.config.max_upload_bytes))
            .with_state(self.state.clone())
    }

    /// 在后台任务中启动服务器，返回实际监听地址
    pub async fn start(&self) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();

        info!("File server listening on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Server error: {}", e);
            }
        });

        Ok(addr)
    }

    /// 在前台运行服务器，`shutdown` 完成后优雅退出
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!("File server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("File server stopped");
        Ok(())
    }
}
