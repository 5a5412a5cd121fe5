//! 基本使用示例
//!
//! 本示例展示了模块运行时的基本使用方法：
//!
//! - 登记入口点并声明模块
//! - 启动运行时，模块发布服务
//! - 另一个模块按过滤器查找并使用服务
//! - 停止运行时
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chips_runtime::{
    Activator, ActivatorRegistry, Framework, FrameworkConfig, ModuleContext, ModuleEntry,
    Properties,
};

const GREETER: &str = "demo.Greeter";

/// 问候服务
struct Greeter {
    language: &'static str,
}

impl Greeter {
    fn greet(&self, name: &str) -> String {
        match self.language {
            "zh" => format!("你好，{}", name),
            _ => format!("Hello, {}", name),
        }
    }
}

/// 发布中英文两个问候服务
struct ProviderActivator;

#[async_trait]
impl Activator for ProviderActivator {
    async fn start(&self, context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        context.register_object(
            &[GREETER],
            Greeter { language: "en" },
            Properties::new().with("language", "en"),
        )?;
        context.register_object(
            &[GREETER],
            Greeter { language: "zh" },
            Properties::new()
                .with("language", "zh")
                .with("service.ranking", 10i64),
        )?;
        Ok(())
    }

    async fn stop(&self, _context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 查找并使用问候服务
struct ConsumerActivator;

#[async_trait]
impl Activator for ConsumerActivator {
    async fn start(&self, context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        if let Some(best) = context.get_service_reference(GREETER)? {
            if let Some(greeter) = context.get_service_as::<Greeter>(&best)? {
                println!("   最佳服务: {}", greeter.greet("世界"));
            }
        }
        for reference in context.get_service_references(Some(GREETER), Some("(language=en)"))? {
            if let Some(greeter) = context.get_service_as::<Greeter>(&reference)? {
                println!("   过滤结果: {}", greeter.greet("world"));
            }
        }
        Ok(())
    }

    async fn stop(&self, _context: &Arc<ModuleContext>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== 模块运行时基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 登记入口点，声明模块
    // -------------------------------------------------------------------------
    let loader = ActivatorRegistry::new()
        .with("provider", || Arc::new(ProviderActivator))
        .with("consumer", || Arc::new(ConsumerActivator));

    let config = FrameworkConfig::builder()
        .synchronous_stop()
        .module(ModuleEntry {
            symbolic_name: Some("demo.provider".to_string()),
            version: Some("1.0.0".to_string()),
            activator: Some("provider".to_string()),
            ..Default::default()
        })
        .module(ModuleEntry {
            symbolic_name: Some("demo.consumer".to_string()),
            activator: Some("consumer".to_string()),
            ..Default::default()
        })
        .build();

    let framework = Framework::new(config, Arc::new(loader));
    println!("1. 已安装 {} 个模块（含系统模块）\n", framework.modules().len());

    // -------------------------------------------------------------------------
    // 2. 启动
    // -------------------------------------------------------------------------
    println!("2. 启动运行时...");
    framework.start().await?;
    for module in framework.modules() {
        println!("   - {} {} {}", module, module.version(), module.state());
    }
    println!();

    // -------------------------------------------------------------------------
    // 3. 停止
    // -------------------------------------------------------------------------
    println!("3. 停止运行时...");
    framework.stop().await?;
    framework.wait_for_stop().await;
    println!("   系统模块状态: {}", framework.system_module().state());

    println!("\n=== 示例完成 ===");
    Ok(())
}
