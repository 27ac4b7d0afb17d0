//! Fileshare Server
//!
//! 独立运行的文件服务器进程：
//! - 接收 multipart 上传，写入上传目录
//! - 在 SQLite 目录中登记文件名
//! - 提供文件列表和下载
//!
//! 配置来源优先级：命令行参数 / 环境变量 > `--config` TOML 文件 > 默认值。

mod service;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fileshare-server")]
#[command(author, version, about = "Personal file sharing server", long_about = None)]
pub struct Args {
    /// TOML 配置文件
    #[arg(short, long, env = "FILESHARE_CONFIG")]
    pub config: Option<PathBuf>,

    /// 监听地址
    #[arg(long, env = "FILESHARE_HOST")]
    pub host: Option<String>,

    /// 监听端口
    #[arg(short, long, env = "FILESHARE_PORT")]
    pub port: Option<u16>,

    /// 上传目录
    #[arg(long, env = "FILESHARE_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// 目录数据库路径
    #[arg(long, env = "FILESHARE_DB")]
    pub database: Option<PathBuf>,

    /// 单次上传大小上限 (MiB)
    #[arg(long)]
    pub max_upload_mb: Option<usize>,

    /// 打印合并后的配置并退出
    #[arg(long)]
    pub print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 桥接 log crate（fileshare-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fileshare_core=debug")),
        )
        .try_init();

    let args = Args::parse();
    let config = service::resolve_config(&args)?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing::info!("Fileshare server starting...");
    service::run(config).await
}
