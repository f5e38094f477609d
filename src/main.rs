//! 服务主入口

use rbac_service::{
    auth::{clock::SystemClock, password::PasswordHasher},
    config::AppConfig,
    db,
    handlers::health,
    middleware::AppState,
    routes, telemetry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("rbac-service {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env.development > .env
    if let Ok(env) = std::env::var("RBAC_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    health::set_start_time();

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rbac-service starting...");

    // 3. 凭据存储：配置了数据库则使用 PostgreSQL，否则使用内存存储
    let store = db::connect_store(&config.database).await?;
    tracing::info!(backend = store.backend(), "Credential store ready");

    // 4. 构建应用状态
    let shutdown_timeout = config.server.graceful_shutdown_timeout_secs;
    let addr = config.server.addr.clone();
    let app_state = Arc::new(AppState::new(
        config,
        store,
        Arc::new(PasswordHasher::new()),
        Arc::new(SystemClock),
    )?);

    // 5. 构建路由
    let app = routes::create_router(app_state);

    // 6. 启动服务器
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "Server listening");

    // 7. 优雅关闭
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_timeout))
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// Resolves on the first signal; in-flight requests then get
/// `timeout_secs` to finish before the process exits.
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, starting graceful shutdown");
        },
    }

    // 超时后强制退出
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
        tracing::warn!("Graceful shutdown timeout reached, forcing exit");
        std::process::exit(1);
    });
}

/// 打印帮助信息
fn print_help() {
    println!("rbac-service {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: rbac-service [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 RBAC_ 前缀的环境变量完成，例如:");
    println!("  RBAC_SECURITY__JWT_SECRET, RBAC_DATABASE__URL, RBAC_LOGGING__LEVEL");
    println!("  可用选项请参考 .env.example");
}
