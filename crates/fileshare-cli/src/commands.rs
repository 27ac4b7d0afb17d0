//! 子命令实现

use anyhow::{Context, Result, bail};
use fileshare_core::{
    ClientConfig, FileShareClient, JsonSettingsFile, ProbeOutcome, SettingsStore, TunnelHandle,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 创建客户端；`url_override` 只对本次调用生效
pub fn build_client(
    url_override: Option<&str>,
    settings_path: Option<PathBuf>,
) -> Result<FileShareClient> {
    let settings: Arc<dyn SettingsStore> = Arc::new(match settings_path {
        Some(path) => JsonSettingsFile::new(path),
        None => JsonSettingsFile::default(),
    });

    let client = match url_override {
        Some(url) => FileShareClient::new(ClientConfig::new(url), settings)?,
        None => FileShareClient::from_settings(settings)?,
    };
    Ok(client)
}

pub async fn ping(client: &FileShareClient) -> Result<()> {
    let url = client.server_url();
    println!("🔗 测试连接: {}", url);
    match client.probe(None).await {
        ProbeOutcome::Reachable => {
            println!("✅ 服务器在线");
            Ok(())
        }
        outcome => bail!("服务器不可用: {}", outcome),
    }
}

pub async fn list(client: &FileShareClient) -> Result<()> {
    let files = client
        .list_files()
        .await
        .with_context(|| format!("无法获取文件列表 ({})", client.server_url()))?;

    if files.is_empty() {
        println!("   (服务器上没有文件)");
    } else {
        for (i, name) in files.iter().enumerate() {
            println!("   [{}] {}", i, name);
        }
    }
    Ok(())
}

pub async fn upload(client: &FileShareClient, path: &Path) -> Result<()> {
    println!("📤 上传文件: {}", path.display());
    client
        .upload_file(path)
        .await
        .with_context(|| format!("上传失败: {}", path.display()))?;
    println!("✅ 上传完成");
    Ok(())
}

pub async fn download(client: &FileShareClient, name: &str, output: Option<PathBuf>) -> Result<()> {
    let dest = output.unwrap_or_else(|| default_destination(name));
    println!("📥 下载 {} → {}", name, dest.display());

    let result = client
        .download_with_progress(name, &dest, |done, total| {
            if let Some(total) = total.filter(|t| *t > 0) {
                print!("\r   {:>5.1}%", done as f64 * 100.0 / total as f64);
                let _ = std::io::stdout().flush();
            }
        })
        .await;
    println!();

    match result {
        Ok(bytes) => {
            println!("✅ 下载完成 ({} bytes)", bytes);
            Ok(())
        }
        Err(e) if e.is_not_found() => bail!("服务器上没有文件: {}", name),
        Err(e) => Err(e).with_context(|| format!("下载失败: {}", name)),
    }
}

pub fn set_url(client: &FileShareClient, url: &str) -> Result<()> {
    let saved = client.set_server_url(url)?;
    println!("💾 服务器地址已保存: {}", saved);
    Ok(())
}

/// 启动隧道，保存公网地址，等待 Ctrl-C 后停止
pub async fn tunnel(client: &FileShareClient, port: u16) -> Result<()> {
    let handle = TunnelHandle::ngrok(port)?;

    println!("🌐 启动 ngrok 隧道 (端口 {})...", port);
    let public_url = handle
        .start()
        .await
        .context("无法启动隧道，请确认 ngrok 已安装并登录")?;

    let saved = client.set_server_url(&public_url)?;
    println!("✅ 公网地址: {}", saved);
    println!("   按 Ctrl-C 停止");

    tokio::signal::ctrl_c().await?;

    println!("⏹️  停止隧道");
    handle.stop().await?;
    Ok(())
}

/// 当前目录下与服务器文件同名的路径
fn default_destination(name: &str) -> PathBuf {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_destination() {
        assert_eq!(default_destination("a.txt"), PathBuf::from("a.txt"));
        assert_eq!(default_destination(".."), PathBuf::from("download"));
    }

    #[test]
    fn test_url_override_not_persisted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server_config.json");

        let client = build_client(Some("example.com"), Some(path.clone())).unwrap();
        assert_eq!(client.server_url(), "https://example.com");
        assert!(!path.exists());
    }

    #[test]
    fn test_set_url_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("server_config.json");

        let client = build_client(None, Some(path.clone())).unwrap();
        set_url(&client, "http://192.168.1.10:5000/").unwrap();

        let reloaded = build_client(None, Some(path)).unwrap();
        assert_eq!(reloaded.server_url(), "http://192.168.1.10:5000");
    }
}
