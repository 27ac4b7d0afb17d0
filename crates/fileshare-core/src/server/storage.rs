//! 上传目录
//!
//! 客户端提供的文件名只能解析为上传目录下的单个普通路径分量。
//! `..`、绝对路径、带分隔符的名称以及指向目录外的符号链接都会被拒绝。
//!
//! 写入先落到 [`STAGING_DIR`] 子目录中的临时文件，完成后再重命名覆盖目标文件，
//! 并发上传同名文件时最后一次重命名生效，字节不会交错。
//! 暂存目录名是保留名，不能上传或下载；服务器启动时清空其中残留的临时文件。

use log::{debug, info};
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// 上传目录错误
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("filename is empty")]
    EmptyName,

    #[error("filename escapes the upload directory: {0}")]
    Escapes(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// 上传暂存子目录，与目标文件位于同一文件系统
pub const STAGING_DIR: &str = ".incoming";

/// 服务器独占的上传目录
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// 创建（如不存在）并规范化上传目录，清理上次运行留下的临时文件
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let root = std::fs::canonicalize(path)?;

        let staging = root.join(STAGING_DIR);
        if staging.exists() {
            let stale = std::fs::read_dir(&staging)?.count();
            if stale > 0 {
                info!("Removing {} stale partial uploads", stale);
            }
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir(&staging)?;

        Ok(Self { root })
    }

    /// 规范化后的根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 把客户端文件名解析为目录内的绝对路径
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() {
            return Err(StorageError::EmptyName);
        }
        if name.contains(['/', '\\', '\0']) {
            return Err(StorageError::Escapes(name.to_string()));
        }

        let mut components = Path::new(name).components();
        let part = match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == OsStr::new(name) => part,
            _ => return Err(StorageError::Escapes(name.to_string())),
        };
        if name == STAGING_DIR {
            return Err(StorageError::Escapes(name.to_string()));
        }

        let candidate = self.root.join(part);

        // 已存在的目标可能是符号链接，规范化后必须仍在根目录内
        if let Ok(real) = std::fs::canonicalize(&candidate)
            && !real.starts_with(&self.root)
        {
            return Err(StorageError::Escapes(name.to_string()));
        }

        Ok(candidate)
    }

    /// 开始写入一个上传文件
    pub async fn begin(&self, name: &str) -> Result<PendingUpload, StorageError> {
        let final_path = self.resolve(name)?;
        let temp_path = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.part", uuid::Uuid::new_v4().simple()));
        let file = File::create(&temp_path).await?;

        Ok(PendingUpload {
            file,
            temp_path,
            final_path,
            written: 0,
        })
    }

    /// 打开已存储的文件，返回文件句柄和大小
    ///
    /// 文件不存在（或不是普通文件）时返回 `ErrorKind::NotFound`。
    pub async fn open(&self, name: &str) -> Result<(File, u64), StorageError> {
        let path = self.resolve(name)?;
        let file = File::open(&path).await?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name} is not a regular file"),
            )));
        }
        Ok((file, metadata.len()))
    }
}

/// 正在写入的上传文件
pub struct PendingUpload {
    file: File,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl PendingUpload {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// 已写入的字节数
    pub fn written(&self) -> u64 {
        self.written
    }

    /// 完成写入并替换目标文件，返回最终路径
    pub async fn commit(mut self) -> Result<PathBuf, StorageError> {
        if let Err(e) = self.file.flush().await {
            self.abort().await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&self.temp_path, &self.final_path).await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(e.into());
        }
        debug!(
            "Stored {} bytes at {:?}",
            self.written, self.final_path
        );
        Ok(self.final_path)
    }

    /// 放弃写入并删除临时文件
    pub async fn abort(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            debug!("Failed to remove {:?}: {}", self.temp_path, e);
        }
    }
}
