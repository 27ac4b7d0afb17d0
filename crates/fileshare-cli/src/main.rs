//! Fileshare CLI
//!
//! 命令行客户端，直接通过 HTTP 与文件服务器通信

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fileshare", version, about = "个人文件共享 - 命令行客户端")]
pub struct Cli {
    /// 本次使用的服务器地址（不保存）
    #[arg(long, global = true, env = "FILESHARE_URL")]
    pub url: Option<String>,

    /// 设置文件路径 (默认: <config_dir>/fileshare/server_config.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 测试服务器连接（配合 --url 可测试任意地址）
    Ping,
    /// 列出服务器上的文件
    List,
    /// 上传文件
    Upload {
        /// 要上传的文件路径
        path: PathBuf,
    },
    /// 下载文件
    Download {
        /// 服务器上的文件名
        name: String,
        /// 保存路径 (默认: 当前目录下同名文件)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 查看或修改保存的服务器地址
    Url {
        #[command(subcommand)]
        action: Option<UrlAction>,
    },
    /// 启动 ngrok 隧道并把服务器地址切换到公网地址
    Tunnel {
        /// 本地服务器端口
        #[arg(short, long, default_value_t = fileshare_core::DEFAULT_PORT)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum UrlAction {
    /// 保存新的服务器地址
    Set { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();

    let cli = Cli::parse();
    let client = commands::build_client(cli.url.as_deref(), cli.settings.clone())?;

    match cli.command {
        Commands::Ping => commands::ping(&client).await,
        Commands::List => commands::list(&client).await,
        Commands::Upload { path } => commands::upload(&client, &path).await,
        Commands::Download { name, output } => {
            commands::download(&client, &name, output).await
        }
        Commands::Url { action: None } => {
            println!("{}", client.server_url());
            Ok(())
        }
        Commands::Url {
            action: Some(UrlAction::Set { url }),
        } => commands::set_url(&client, &url),
        Commands::Tunnel { port } => commands::tunnel(&client, port).await,
    }
}
