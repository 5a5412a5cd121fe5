//! Chips Runtime 命令行入口
//!
//! # 命令概览
//!
//! - `start` - 启动运行时，安装配置中的模块，Ctrl+C 后停止
//! - `check-config` - 验证配置文件
//! - `list-modules` - 列出配置中声明的模块
//! - `version` - 显示版本信息
//!
//! # 使用示例
//!
//! ```bash
//! chips-runtime -c runtime.yaml start
//! chips-runtime check-config -c runtime.yaml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use chips_runtime::{
    Activator, ActivatorRegistry, Framework, FrameworkConfig, Logger, LoggerConfig,
    ModuleContext, Properties,
};

/// Chips Runtime - 薯片模块运行时
#[derive(Parser)]
#[command(name = "chips-runtime")]
#[command(version, about = "进程内模块运行时", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "runtime.yaml", global = true)]
    config: PathBuf,

    /// 日志级别，覆盖配置文件 (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 子命令
    #[command(subcommand)]
    command: Option<Commands>,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 启动运行时
    ///
    /// 安装配置中声明的模块并启动，按 Ctrl+C 停止。
    Start,

    /// 验证配置文件
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 列出配置中声明的模块
    ListModules,

    /// 查看版本信息
    Version,
}

// ============================================================================
// 内置入口点
// ============================================================================

/// 内置回显服务接口名
const ECHO_INTERFACE: &str = "chips.runtime.Echo";

/// 回显服务
struct EchoService {
    prefix: String,
}

impl EchoService {
    fn echo(&self, message: &str) -> String {
        format!("{}{}", self.prefix, message)
    }
}

/// 注册回显服务的入口点
struct EchoActivator;

#[async_trait]
impl Activator for EchoActivator {
    async fn start(&self, context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        let module = context.module()?;
        let prefix = context
            .property("echo.prefix")
            .unwrap_or_else(|| format!("[{}] ", module.id()));
        let service = EchoService { prefix };
        info!(module_id = module.id(), reply = %service.echo("ready"), "回显服务已就绪");
        context.register_object(&[ECHO_INTERFACE], service, Properties::new())?;
        Ok(())
    }

    async fn stop(&self, _context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 不做任何事的入口点
struct NoopActivator;

#[async_trait]
impl Activator for NoopActivator {
    async fn start(&self, _context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        Ok(())
    }
}

fn builtin_activators() -> ActivatorRegistry {
    ActivatorRegistry::new()
        .with("echo", || Arc::new(EchoActivator))
        .with("noop", || Arc::new(NoopActivator))
}

// ============================================================================
// 命令实现
// ============================================================================

/// 启动运行时
async fn run_start(config: FrameworkConfig) -> Result<(), Box<dyn std::error::Error>> {
    let framework = Framework::new(config, Arc::new(builtin_activators()));
    framework.start().await?;

    let active = framework
        .modules()
        .iter()
        .filter(|m| !m.is_system() && m.state() == chips_runtime::ModuleState::Active)
        .count();
    println!();
    println!("薯片模块运行时已启动 (版本 {})", chips_runtime::VERSION);
    println!("  已安装模块: {}", framework.modules().len() - 1);
    println!("  运行中模块: {}", active);
    println!("  已注册服务: {}", framework.registry().service_count());
    println!("按 Ctrl+C 停止");
    println!();

    signal::ctrl_c().await?;

    info!("收到关闭信号，正在停止...");
    framework.stop().await?;
    framework.wait_for_stop().await;
    info!("运行时已停止");
    Ok(())
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());

    match FrameworkConfig::from_file(path).await {
        Ok(config) => {
            println!("✅ 配置文件有效！");
            println!("────────────────────────────────────────");
            println!("  日志级别:       {}", config.logging.level);
            println!("  同步投递:       {}", config.events.synchronous_delivery);
            println!("  同步停止:       {}", config.events.synchronous_stop);
            println!("  监听器超时:     {} ms", config.events.handler_timeout_ms);
            println!("  模块数:         {}", config.modules.len());
            println!("  运行时属性:     {}", config.properties.len());
            println!("────────────────────────────────────────");
            Ok(())
        }
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            Err(Box::new(e))
        }
    }
}

/// 列出配置中声明的模块
fn list_modules(config: &FrameworkConfig) {
    let builtin = builtin_activators();
    println!("{:<6} {:<32} {:<12} {}", "序号", "符号名", "版本", "入口点");
    for (index, descriptor) in config.module_descriptors().iter().enumerate() {
        let activator = match descriptor.activator.as_deref() {
            Some(id) if builtin.contains(id) => id.to_string(),
            Some(id) => format!("{} (未内置)", id),
            None => "-".to_string(),
        };
        println!(
            "{:<6} {:<32} {:<12} {}",
            index,
            descriptor.symbolic_name.as_deref().unwrap_or("-"),
            descriptor.version,
            activator
        );
    }
}

/// 打印版本信息
fn print_version() {
    println!("Chips Runtime - 薯片模块运行时");
    println!("  版本:     {}", chips_runtime::VERSION);
    println!("  目标平台: {}", std::env::consts::ARCH);
    println!("  操作系统: {}", std::env::consts::OS);
}

/// 加载配置文件，不存在时使用默认配置
async fn load_config(path: &Path) -> Result<FrameworkConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(FrameworkConfig::from_file(path).await?)
    } else {
        Ok(FrameworkConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Start) | None => {
            let mut config = load_config(&cli.config).await?;
            if let Some(level) = cli.log_level {
                config.logging.level = level;
            }
            let _guard = Logger::init(LoggerConfig::from_log_config(&config.logging))?;
            if !cli.config.exists() {
                warn!(path = %cli.config.display(), "配置文件不存在，使用默认配置");
            }
            run_start(config).await?;
        }
        Some(Commands::CheckConfig { config }) => {
            let path = config.unwrap_or(cli.config);
            check_config(&path).await?;
        }
        Some(Commands::ListModules) => {
            let config = load_config(&cli.config).await?;
            list_modules(&config);
        }
        Some(Commands::Version) => {
            print_version();
        }
    }

    Ok(())
}
