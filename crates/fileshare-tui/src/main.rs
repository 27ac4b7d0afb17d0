//! Fileshare TUI - 交互式终端客户端
//!
//! 使用 ratatui 提供文件列表、上传下载和隧道控制界面。
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p fileshare-tui 2>> /tmp/fileshare.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use fileshare_core::{
    ClientConfig, DEFAULT_PORT, FileShareClient, JsonSettingsFile, LogLevel, SettingsStore,
    TunnelHandle,
};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, InputMode, Tab};
use tui_log::TuiLogLayer;

#[derive(Parser, Debug)]
#[command(name = "fileshare-tui", version, about = "个人文件共享 - 终端客户端")]
struct Args {
    /// 设置文件路径 (默认: <config_dir>/fileshare/server_config.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// 本次使用的服务器地址（不保存，连接成功后才保存）
    #[arg(long, env = "FILESHARE_URL")]
    url: Option<String>,

    /// 本地服务器端口，用于 'l' 和隧道
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 下载目录 (默认: 系统下载目录)
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// 启动后立即开启隧道
    #[arg(long)]
    tunnel: bool,

    /// 日志面板显示的最低级别 (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings: Arc<dyn SettingsStore> = Arc::new(match &args.settings {
        Some(path) => JsonSettingsFile::new(path),
        None => JsonSettingsFile::default(),
    });
    let client = match &args.url {
        Some(url) => FileShareClient::new(ClientConfig::new(url), settings)?,
        None => FileShareClient::from_settings(settings)?,
    };
    let tunnel = TunnelHandle::ngrok(args.port)?;
    let download_dir = args
        .download_dir
        .clone()
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut app = App::new(Arc::new(client), Arc::new(tunnel), download_dir, args.port);
    app.min_log_level = args.log_level;

    // 初始化日志系统，发送到 TUI 日志面板
    init_logging(app.event_tx.clone());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // 启动时先测试已保存的地址
    let url = app.client.server_url();
    app.connect(url);
    if args.tunnel {
        app.toggle_tunnel();
    }

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // 退出前停止隧道
    if let Err(e) = app.tunnel.stop().await {
        eprintln!("⚠️  停止隧道失败: {}", e);
    }

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: tokio::sync::mpsc::Sender<app::AppEvent>) {
    // 桥接 log crate（fileshare-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fileshare_core=debug"));

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        // 使用 poll 避免无限阻塞
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            if app.input_mode != InputMode::Normal {
                match key.code {
                    KeyCode::Esc => app.cancel_input(),
                    KeyCode::Enter => app.submit_input(),
                    KeyCode::Char(c) => app.input_buffer.push(c),
                    KeyCode::Backspace => {
                        app.input_buffer.pop();
                    }
                    _ => {}
                }
            } else {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('c') => app.begin_edit_url(),
                    KeyCode::Char('l') => app.use_local_server(),
                    KeyCode::Char('r') => app.refresh(),
                    KeyCode::Char('u') => app.begin_upload(),
                    KeyCode::Char('d') | KeyCode::Enter => app.begin_download(),
                    KeyCode::Char('t') => app.toggle_tunnel(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous_file(),
                    KeyCode::Down | KeyCode::Char('j') => app.next_file(),
                    KeyCode::Tab => app.next_tab(),
                    KeyCode::Char('1') => app.tab = Tab::Files,
                    KeyCode::Char('2') => app.tab = Tab::Log,
                    KeyCode::Char('v') => app.toggle_log_level(),
                    KeyCode::Char('x') => app.clear_logs(),
                    _ => {}
                }
            }
        }

        // 处理后台任务事件
        app.tick();
    }
}
