//! bee-admin：管理员侧单次处理
//!
//! - `bee-admin [thread_id]`：若线程在等待人工，显示问题、读取一行答复并恢复执行
//! - `bee-admin --list`：列出所有等待人工的线程

use anyhow::Context;
use bee_handoff::{
    agent::create_engine,
    config::{load_config, AppConfig},
    observability,
    ui::{list_pending, run_admin},
};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    let engine = create_engine(&cfg).context("Failed to create workflow engine")?;

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--list") {
        list_pending(&engine, tokio::io::stdout())
            .await
            .context("Failed to list pending threads")?;
        return Ok(());
    }

    let thread_id = arg.unwrap_or_else(|| cfg.app.thread_id.clone());
    let outcome = run_admin(
        &engine,
        &thread_id,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
    .with_context(|| format!("Failed to handle thread {}", thread_id))?;
    tracing::info!(thread_id = %thread_id, ?outcome, "admin check finished");

    Ok(())
}
