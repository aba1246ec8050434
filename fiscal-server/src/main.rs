use anyhow::Context;
use fiscal_server::{Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 配置, 日志)
    let config = setup_environment();

    print_banner();
    tracing::info!(
        environment = %config.environment,
        work_dir = %config.work_dir,
        "Fiscal server starting..."
    );

    if let Some(dir) = config.log_dir.as_deref()
        && let Err(e) = fiscal_server::cleanup_old_logs(dir, 30)
    {
        tracing::warn!(error = %e, "Failed to clean up old logs");
    }

    // 2. 初始化服务器状态
    let state = ServerState::initialize(&config)
        .await
        .context("failed to initialize server state")?;

    // 3. 启动 HTTP 服务器 (Server::run 会自动启动后台任务)
    let server = Server::with_state(config, state);
    server.run().await.context("server error")?;

    Ok(())
}
