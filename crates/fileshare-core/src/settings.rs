//! 客户端设置持久化
//!
//! 只保存一项：服务器地址。文件格式为 `{"server_url": "..."}`。
//! 客户端通过 [`SettingsStore`] 读写设置，不直接接触文件。

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// 默认服务器地址
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// 设置文件名
pub const SETTINGS_FILE_NAME: &str = "server_config.json";

/// 客户端设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub server_url: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 设置的读写接口
pub trait SettingsStore: Send + Sync {
    /// 读取设置；无法读取时返回默认值
    fn load(&self) -> ClientSettings;

    /// 保存设置
    fn save(&self, settings: &ClientSettings) -> Result<(), SettingsError>;
}

/// JSON 文件设置
#[derive(Debug, Clone)]
pub struct JsonSettingsFile {
    path: PathBuf,
}

impl JsonSettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认位置: `<config_dir>/fileshare/server_config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fileshare")
            .join(SETTINGS_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonSettingsFile {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl SettingsStore for JsonSettingsFile {
    fn load(&self) -> ClientSettings {
        if !self.path.exists() {
            return ClientSettings::default();
        }
        match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", self.path);
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse settings: {}, using defaults", e);
                    ClientSettings::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file: {}, using defaults", e);
                ClientSettings::default()
            }
        }
    }

    fn save(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(settings)?;
        fs::write(&self.path, content)?;
        debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

/// 内存中的设置（测试和嵌入使用）
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: Mutex<ClientSettings>,
}

impl MemorySettings {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(ClientSettings {
                server_url: url.into(),
            }),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> ClientSettings {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        Ok(())
    }
}
