//! NLST仪表盘服务主程序

mod settings;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use nlst_engine::DashboardSession;
use nlst_warehouse::{SqlWarehouse, WarehousePool};
use nlst_web::{AppState, WebServer};

use crate::settings::Settings;

/// 服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "nlst-server")]
#[command(about = "NLST影像体积仪表盘服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 缓存模式：启动时取一次表，之后所有请求走内存过滤
    #[arg(long)]
    cached: bool,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    info!("服务配置:");
    info!("  服务名: {}", settings.server.name);
    info!("  监听地址: {}:{}", settings.server.host, settings.server.port);
    info!("  默认行数上限: {}", settings.warehouse.default_limit);
    info!("  缓存模式: {}", args.cached);

    // 仓库认证失败时快速失败退出
    let pool = WarehousePool::connect(&settings.warehouse)
        .await
        .context("connecting to warehouse")?;
    let warehouse = SqlWarehouse::new(pool, settings.warehouse.clone());

    let session = if args.cached {
        let session = DashboardSession::load(&warehouse, None)
            .await
            .context("prefetching dashboard session")?;
        Some(Arc::new(session))
    } else {
        None
    };

    let state = AppState {
        service_name: settings.server.name.clone(),
        warehouse: Arc::new(warehouse),
        session,
        default_limit: settings.warehouse.default_limit,
        require_structure: settings.warehouse.require_structure,
    };

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("parsing listen address")?;
    WebServer::new(addr, state, &settings.cors)?.run().await?;

    Ok(())
}
