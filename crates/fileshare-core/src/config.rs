//! 服务器配置
//!
//! 监听地址、上传目录、目录数据库路径等设置的读取。
//! 配置文件为可选的 TOML，缺失的字段取默认值。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::DEFAULT_PORT;

/// 默认上传大小上限 (1 GiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// 文件服务器设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口（0 表示随机端口）
    pub port: u16,
    /// 上传目录
    pub upload_dir: PathBuf,
    /// 目录数据库路径
    pub database_path: PathBuf,
    /// 单次请求体大小上限
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from("uploads"),
            database_path: PathBuf::from("fileshare.sqlite3"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl ServerConfig {
    /// 从 TOML 文件加载配置
    ///
    /// 文件不存在时使用默认值；文件存在但无法解析时返回错误。
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!("No server config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid server config {}: {}", path.display(), e))?;
        debug!("Loaded server config from {:?}", path);
        Ok(config)
    }

    /// 序列化为 TOML（用于 `--print-config`）
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 监听地址 `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.bind_addr(), "0.0.0.0:5000");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = ServerConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server.toml");
        fs::write(&path, "port = 8080\nupload_dir = \"/srv/files\"\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("/srv/files"));
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server.toml");
        fs::write(&path, "port = \"not a number\"").unwrap();
        assert!(ServerConfig::load(&path).is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ServerConfig {
            port: 9000,
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
