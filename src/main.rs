//! bee-chat：用户侧聊天循环
//!
//! 用法：`bee-chat [thread_id]`，未指定时用配置 [app].thread_id（默认 t1）。
//! 升级给人工后循环进入等待，另开终端运行 `bee-admin` 处理。

use anyhow::Context;
use bee_handoff::{
    agent::create_engine,
    config::{load_config, AppConfig},
    core::ShutdownManager,
    observability,
    ui::run_chat,
};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    let thread_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| cfg.app.thread_id.clone());

    let engine = create_engine(&cfg).context("Failed to create workflow engine")?;

    let shutdown = ShutdownManager::new();
    shutdown.install_signal_handlers();

    run_chat(
        &engine,
        &thread_id,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        cfg.chat.poll_interval(),
        shutdown.token(),
    )
    .await
    .context("Chat loop failed")?;

    Ok(())
}
