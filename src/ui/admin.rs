//! 管理员侧：单次检查挂起的线程，读取一行答复并 resume
//!
//! 恢复后的回复从引擎事件实时打印；线程若停在图中间，先 recover 再看是否仍有待处理任务。

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::TryRecvError;

use crate::core::EngineError;
use crate::memory::Role;
use crate::ui::chat::load_state;
use crate::workflow::{EngineEvent, ExecutionState, RunStatus, WorkflowEngine};

/// run_admin 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AdminOutcome {
    NoPending,
    /// 已恢复；replies 为恢复后新增的 assistant 消息数
    Resumed { replies: usize },
    /// 中途中断的线程已跑完，没有等待答复的任务
    Recovered { replies: usize },
    /// 没有读到答复（输入结束或空行），状态未改动
    Aborted,
}

pub async fn run_admin<R, W>(
    engine: &WorkflowEngine,
    thread_id: &str,
    mut input: R,
    mut output: W,
) -> anyhow::Result<AdminOutcome>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut state = load_state(engine, thread_id).await?;

    if let Some(interrupted) = state
        .as_ref()
        .filter(|s| s.status() == RunStatus::Interrupted)
    {
        tracing::info!(thread_id, next = %interrupted.next, "finishing interrupted run");
        let (result, replies) =
            print_replies_while(engine, thread_id, engine.recover(thread_id), &mut output).await?;
        let recovered = result?;
        if !recovered.is_suspended() {
            output.flush().await?;
            return Ok(AdminOutcome::Recovered { replies });
        }
        state = Some(recovered);
    }

    let Some(pending) = state.and_then(|s| s.pending_interrupt) else {
        output.write_all(b"No pending tasks.\n").await?;
        output.flush().await?;
        return Ok(AdminOutcome::NoPending);
    };

    let query = pending
        .query()
        .map(str::to_string)
        .unwrap_or_else(|| pending.payload.to_string());
    output
        .write_all(format!("User asks: {}\nAdmin Answer: ", query).as_bytes())
        .await?;
    output.flush().await?;

    let mut answer = String::new();
    if input.read_line(&mut answer).await? == 0 || answer.trim().is_empty() {
        output.write_all(b"\nNo answer given, task left pending.\n").await?;
        output.flush().await?;
        return Ok(AdminOutcome::Aborted);
    }

    let (result, replies) = print_replies_while(
        engine,
        thread_id,
        engine.resume(thread_id, answer.trim()),
        &mut output,
    )
    .await?;
    match result {
        Ok(_) => {}
        // 另一个管理员已经处理
        Err(EngineError::NoPendingInterrupt(_)) => {
            output.write_all(b"No pending tasks.\n").await?;
            output.flush().await?;
            return Ok(AdminOutcome::NoPending);
        }
        Err(e) => return Err(e.into()),
    }
    output.flush().await?;
    Ok(AdminOutcome::Resumed { replies })
}

/// 执行 work 期间把该线程新产生的 assistant 回复逐条打印出来
async fn print_replies_while<W, F>(
    engine: &WorkflowEngine,
    thread_id: &str,
    work: F,
    output: &mut W,
) -> anyhow::Result<(Result<ExecutionState, EngineError>, usize)>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = Result<ExecutionState, EngineError>>,
{
    let mut events = engine.subscribe();
    tokio::pin!(work);

    let mut replies = 0;
    let result = loop {
        tokio::select! {
            biased;
            event = events.recv() => {
                if let Ok(event) = event {
                    replies += write_reply(thread_id, &event, output).await?;
                }
            }
            result = &mut work => break result,
        }
    };

    // work 结束时尚未取走的事件
    loop {
        match events.try_recv() {
            Ok(event) => replies += write_reply(thread_id, &event, output).await?,
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(thread_id, skipped, "admin view fell behind engine events");
            }
            Err(_) => break,
        }
    }
    Ok((result, replies))
}

async fn write_reply<W>(thread_id: &str, event: &EngineEvent, output: &mut W) -> anyhow::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    match event {
        EngineEvent::Message {
            thread_id: id,
            message,
        } if id == thread_id
            && message.role == Role::Assistant
            && !message.content.trim().is_empty() =>
        {
            output
                .write_all(format!("AI (Resumed): {}\n", message.content).as_bytes())
                .await?;
            output.flush().await?;
            Ok(1)
        }
        _ => Ok(0),
    }
}

/// 列出所有等待管理员的线程及其问题
pub async fn list_pending<W>(engine: &WorkflowEngine, mut output: W) -> anyhow::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let threads = engine.pending_threads().await?;
    if threads.is_empty() {
        output.write_all(b"No pending tasks.\n").await?;
    }
    for thread_id in &threads {
        let query = load_state(engine, thread_id)
            .await?
            .and_then(|s| s.pending_interrupt)
            .and_then(|p| p.query().map(str::to_string))
            .unwrap_or_default();
        output
            .write_all(format!("{}\t{}\n", thread_id, query).as_bytes())
            .await?;
    }
    output.flush().await?;
    Ok(threads.len())
}
