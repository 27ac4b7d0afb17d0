//! 配置合并与服务器生命周期

use anyhow::Result;
use fileshare_core::{FileServer, ServerConfig};

use crate::Args;

/// 读取配置文件并应用命令行覆盖
pub fn resolve_config(args: &Args) -> Result<ServerConfig> {
    let base = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    Ok(apply_overrides(base, args))
}

fn apply_overrides(mut config: ServerConfig, args: &Args) -> ServerConfig {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = &args.upload_dir {
        config.upload_dir = dir.clone();
    }
    if let Some(db) = &args.database {
        config.database_path = db.clone();
    }
    if let Some(mb) = args.max_upload_mb {
        config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
    }
    config
}

/// 运行服务器直到收到 Ctrl-C
pub async fn run(config: ServerConfig) -> Result<()> {
    let server = FileServer::new(config)?;

    tracing::info!(
        "Serving {} on http://{}",
        server.upload_dir().root().display(),
        server.config().bind_addr()
    );

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await
}
