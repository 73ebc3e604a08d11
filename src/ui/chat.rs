//! 用户侧聊天循环
//!
//! 每轮先从存储读取最新状态并打印新消息；线程挂起时只轮询不读输入，
//! 管理员在另一进程 resume 后，新消息会在下一次轮询时出现。
//! 指针停在图中间（某个进程执行到一半退出）时先 recover，再读取新输入。

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::core::EngineError;
use crate::memory::{Message, Role};
use crate::workflow::{ExecutionState, RunStatus, WorkflowEngine};

/// q / exit（不区分大小写）结束循环
pub fn is_quit(text: &str) -> bool {
    text.eq_ignore_ascii_case("q") || text.eq_ignore_ascii_case("exit")
}

/// 用户消息不回显；空的 assistant 消息跳过
pub fn render_message(msg: &Message) -> Option<String> {
    match msg.role {
        Role::Assistant if !msg.content.trim().is_empty() => Some(format!("AI: {}", msg.content)),
        Role::System => Some(format!("SYSTEM: {}", msg.content)),
        _ => None,
    }
}

pub(crate) async fn load_state(
    engine: &WorkflowEngine,
    thread_id: &str,
) -> Result<Option<ExecutionState>, EngineError> {
    match engine.get_state(thread_id).await {
        Ok(state) => Ok(Some(state)),
        Err(EngineError::ThreadNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// 运行聊天循环，直到 quit 输入、输入结束或 cancel 被触发；退出本身不写任何状态
pub async fn run_chat<R, W>(
    engine: &WorkflowEngine,
    thread_id: &str,
    input: R,
    mut output: W,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("--- Chat {} ---\n", thread_id).as_bytes())
        .await?;
    output.flush().await?;

    let mut lines = input.lines();
    let mut seen = load_state(engine, thread_id)
        .await?
        .map(|s| s.messages().len())
        .unwrap_or(0);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(state) = load_state(engine, thread_id).await? {
            let messages = state.messages();
            if messages.len() > seen {
                for msg in &messages[seen..] {
                    if let Some(line) = render_message(msg) {
                        output.write_all(format!("\n{}\n", line).as_bytes()).await?;
                    }
                }
            }
            seen = messages.len();

            if state.is_suspended() {
                output.write_all(b"Waiting for admin...\r").await?;
                output.flush().await?;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(poll_interval) => continue,
                }
            }

            if state.status() == RunStatus::Interrupted {
                tracing::info!(thread_id, next = %state.next, "finishing interrupted run");
                match engine.recover(thread_id).await {
                    Ok(_) => continue,
                    // 另一个进程正在推进同一线程
                    Err(e @ EngineError::Conflict { .. }) => {
                        tracing::info!(thread_id, error = %e, "thread advanced elsewhere");
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => continue,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(thread_id, error = %e, "recover failed");
                        output.write_all(format!("\nError: {}\n", e).as_bytes()).await?;
                    }
                }
            }
        }

        output.write_all(b"\nUser: ").await?;
        output.flush().await?;

        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if is_quit(text) {
            break;
        }

        if let Err(e) = engine.invoke(thread_id, text).await {
            if e.is_benign() {
                tracing::info!(thread_id, error = %e, "input not accepted");
            } else {
                tracing::warn!(thread_id, error = %e, "invoke failed");
                output.write_all(format!("\nError: {}\n", e).as_bytes()).await?;
            }
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
