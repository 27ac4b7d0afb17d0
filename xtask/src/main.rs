use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use xshell::{Shell, cmd};

const BINARIES: [&str; 3] = ["fileshare-server", "fileshare", "fileshare-tui"];

#[derive(Parser)]
#[command(name = "xtask", about = "Fileshare 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 运行文件服务器 (开发模式)
    Serve {
        /// 监听端口
        #[arg(short, long, default_value = "5000")]
        port: u16,
    },
    /// 运行 TUI (开发模式)
    Tui {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认 /tmp/fileshare.log)
        #[arg(short = 'o', long)]
        log_file: Option<String>,
    },
    /// 同时启动服务器和 TUI，TUI 退出时停止服务器
    Launch {
        /// 服务器端口
        #[arg(short, long, default_value = "5000")]
        port: u16,
        /// 启动后立即开启 ngrok 隧道
        #[arg(long)]
        tunnel: bool,
    },
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
        Err(_) => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Serve { port } => serve(&sh, port)?,
        Commands::Tui {
            log_level,
            log_file,
        } => tui(&sh, &log_level, log_file)?,
        Commands::Launch { port, tunnel } => launch(&sh, port, tunnel)?,
        Commands::Dist => dist(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    cmd!(
        sh,
        "cargo build --release -p fileshare-server -p fileshare-cli -p fileshare-tui"
    )
    .run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn serve(sh: &Shell, port: u16) -> Result<()> {
    println!("🚀 启动开发模式文件服务器 (端口 {})...", port);
    let port = port.to_string();
    cmd!(sh, "cargo run -p fileshare-server -- --port {port}").run()?;
    Ok(())
}

fn tui(sh: &Shell, log_level: &str, log_file: Option<String>) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| "/tmp/fileshare.log".to_string());

    println!("🖥️  启动 TUI 调试模式...");
    println!("   日志级别: {}", log_level);
    println!("   日志文件: {}", log_file);
    println!();
    println!("💡 提示: 在另一个终端运行以下命令查看实时日志:");
    println!("   tail -f {}", log_file);
    println!();

    let rust_log = format!(
        "{level},fileshare_core={level},hyper=info,reqwest=info",
        level = log_level
    );

    // 使用 shell 执行以支持重定向
    let command = format!(
        "RUST_LOG='{}' cargo run -p fileshare-tui 2>> '{}'",
        rust_log, log_file
    );

    cmd!(sh, "bash -c {command}").run()?;

    println!();
    println!("📁 日志已保存到: {}", log_file);
    Ok(())
}

fn launch(sh: &Shell, port: u16, tunnel: bool) -> Result<()> {
    println!("🚀 启动服务器和 TUI...");

    cmd!(sh, "cargo build -p fileshare-server -p fileshare-tui").run()?;

    let target = sh.current_dir().join("target").join("debug");
    let port_arg = port.to_string();

    let mut server = Command::new(target.join("fileshare-server"))
        .args(["--port", &port_arg])
        .env("RUST_LOG", "warn")
        .spawn()?;

    // 给服务器一点启动时间
    std::thread::sleep(Duration::from_secs(1));
    if let Some(status) = server.try_wait()? {
        anyhow::bail!("服务器启动失败: {}", status);
    }

    let local_url = format!("http://localhost:{}", port);
    let mut tui = Command::new(target.join("fileshare-tui"));
    tui.args(["--port", &port_arg, "--url", &local_url]);
    if tunnel {
        tui.arg("--tunnel");
    }

    let result = tui.status();
    stop_process(&mut server, "服务器");

    let status = result?;
    if !status.success() {
        anyhow::bail!("TUI 异常退出: {}", status);
    }
    println!("✅ 所有进程已停止");
    Ok(())
}

fn stop_process(child: &mut Child, name: &str) {
    if let Ok(None) = child.try_wait() {
        println!("⏹️  停止{}...", name);
        let _ = child.kill();
        let _ = child.wait();
    }
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("fileshare-{}-linux-x86_64", version);

    cmd!(sh, "mkdir -p dist/{dist_name}").run()?;
    for bin in BINARIES {
        cmd!(sh, "cp target/release/{bin} dist/{dist_name}/").run()?;
    }
    if sh.path_exists("README.md") {
        cmd!(sh, "cp README.md dist/{dist_name}/").run()?;
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czvf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{}.tar.gz", dist_name);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages fileshare-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    sh.remove_path("dist")?;
    println!("✅ 清理完成");
    Ok(())
}
