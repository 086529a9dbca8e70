use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Updrop 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建 updrop (release)
    Build,
    /// 运行仪表盘 (开发模式)
    Run {
        /// 监听端口
        #[arg(default_value = "8000")]
        port: u16,
        /// 服务目录
        #[arg(default_value = ".")]
        path: String,
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认 /tmp/updrop.log)
        #[arg(short = 'o', long)]
        log_file: Option<String>,
    },
    /// 运行测试
    Test,
    /// 格式检查和 clippy
    Lint,
    /// 打包发布 (tar.gz)
    Dist,
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
            .map(PathBuf::from)
            .context("xtask has no parent directory")?,
        Err(_) => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Run {
            port,
            path,
            log_level,
            log_file,
        } => run(&sh, port, &path, &log_level, log_file)?,
        Commands::Test => test(&sh)?,
        Commands::Lint => lint(&sh)?,
        Commands::Dist => dist(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建 updrop...");
    cmd!(sh, "cargo build --release -p updrop-tui").run()?;
    println!("✅ 构建完成: target/release/updrop");
    Ok(())
}

fn run(sh: &Shell, port: u16, path: &str, log_level: &str, log_file: Option<String>) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| "/tmp/updrop.log".to_string());

    println!("🖥️  启动 updrop 调试模式...");
    println!("   日志级别: {log_level}");
    println!("   日志文件: {log_file}");
    println!();
    println!("💡 提示: 在另一个终端运行以下命令查看实时日志:");
    println!("   tail -f {log_file}");
    println!();

    let rust_log = format!("{log_level},updrop_core={log_level}");
    let port = port.to_string();

    // 使用 shell 执行以支持重定向
    let command = format!(
        "RUST_LOG='{rust_log}' cargo run -p updrop-tui -- {port} '{path}' 2>> '{log_file}'"
    );
    cmd!(sh, "bash -c {command}").run()?;

    println!();
    println!("📁 日志已保存到: {log_file}");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    println!("🔍 检查代码...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    println!("✅ 检查通过");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("updrop-{version}-linux-x86_64");

    cmd!(sh, "mkdir -p dist/{dist_name}").run()?;
    cmd!(sh, "cp target/release/updrop dist/{dist_name}/").run()?;
    if sh.path_exists("README.md") {
        cmd!(sh, "cp README.md dist/{dist_name}/").run()?;
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czvf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{dist_name}.tar.gz");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    cmd!(sh, "rm -rf dist").run()?;
    println!("✅ 清理完成");
    Ok(())
}
