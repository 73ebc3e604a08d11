//! 工作流引擎
//!
//! 逐节点驱动线程的工作流：每个节点执行成功后立即写 checkpoint，再计算下一条边。
//! 节点失败时不写任何东西，已存状态保持在上一个节点边界。
//! 同一线程同一时刻只有一个 invoke / resume 在执行（进程内互斥 + 存储层 CAS 跨进程）。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::core::EngineError;
use crate::memory::Message;
use crate::workflow::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::node::NodeContext;
use crate::workflow::{ExecutionState, NodeId, PendingInterrupt, RunStatus, ThreadId};

/// 单次 invoke / resume 最多执行的节点数
pub const DEFAULT_MAX_STEPS: usize = 25;

/// 执行过程事件（订阅方如管理员 CLI 据此实时展示新回复）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 节点执行完毕且 checkpoint 已写入
    NodeCompleted {
        thread_id: ThreadId,
        node: NodeId,
        step: u64,
    },
    /// 新追加到历史的消息
    Message { thread_id: ThreadId, message: Message },
    Suspended { thread_id: ThreadId, payload: Value },
    Resumed { thread_id: ThreadId },
    /// 到达 End
    Finished { thread_id: ThreadId },
}

pub struct WorkflowEngine {
    graph: WorkflowGraph,
    store: Arc<dyn CheckpointStore>,
    locks: Mutex<HashMap<ThreadId, Arc<Mutex<()>>>>,
    events: broadcast::Sender<EngineEvent>,
    max_steps: usize,
}

impl WorkflowEngine {
    pub fn new(graph: WorkflowGraph, store: Arc<dyn CheckpointStore>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            graph,
            store,
            locks: Mutex::new(HashMap::new()),
            events,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    /// 释放线程锁；最后一个持有者离开时移除条目
    async fn release_thread_lock(&self, thread_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks
            .get(thread_id)
            .is_some_and(|held| Arc::strong_count(held) == 1)
        {
            locks.remove(thread_id);
        }
    }

    /// 在线程锁内执行 `work`
    async fn with_thread_lock<T>(&self, thread_id: &str, work: impl Future<Output = T>) -> T {
        let lock = self.thread_lock(thread_id).await;
        let out = {
            let _guard = lock.lock().await;
            work.await
        };
        self.release_thread_lock(thread_id, lock).await;
        out
    }

    #[cfg(test)]
    pub(crate) async fn tracked_locks(&self) -> usize {
        self.locks.lock().await.len()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// 追加用户消息（线程不存在则创建）并从当前指针开始执行，直到 End、挂起或无后继
    pub async fn invoke(
        &self,
        thread_id: &str,
        user_message: impl Into<String>,
    ) -> Result<ExecutionState, EngineError> {
        let user_message = user_message.into();
        self.with_thread_lock(thread_id, self.invoke_locked(thread_id, user_message))
            .await
    }

    async fn invoke_locked(
        &self,
        thread_id: &str,
        user_message: String,
    ) -> Result<ExecutionState, EngineError> {
        let mut state = self
            .store
            .load(thread_id)
            .await?
            .unwrap_or_else(|| ExecutionState::new(thread_id));

        if state.is_suspended() {
            return Err(EngineError::InterruptPending(thread_id.to_string()));
        }

        state.push_message(Message::user(user_message));
        if state.next.is_marker() {
            state.next = self.graph.entry();
        }

        tracing::info!(thread_id, step = state.step, next = %state.next, "invoke");
        self.drive(state, None).await
    }

    /// 以外部输入恢复挂起的线程：输入作为挂起节点的 continuation，随后按后继继续执行
    pub async fn resume(
        &self,
        thread_id: &str,
        input: impl Into<String>,
    ) -> Result<ExecutionState, EngineError> {
        let input = input.into();
        self.with_thread_lock(thread_id, self.resume_locked(thread_id, input))
            .await
    }

    async fn resume_locked(
        &self,
        thread_id: &str,
        input: String,
    ) -> Result<ExecutionState, EngineError> {
        let mut state = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;

        let pending = state
            .pending_interrupt
            .as_mut()
            .ok_or_else(|| EngineError::NoPendingInterrupt(thread_id.to_string()))?;
        if pending.node != state.next || !self.graph.is_interruptible(pending.node) {
            return Err(EngineError::CorruptState(format!(
                "thread {thread_id} suspended at {} but pointer is {}",
                pending.node, state.next
            )));
        }
        pending.resolved = true;

        tracing::info!(thread_id, step = state.step, node = %state.next, "resume");
        self.emit(EngineEvent::Resumed {
            thread_id: thread_id.to_string(),
        });
        self.drive(state, Some(input)).await
    }

    /// 从最近的 checkpoint 继续执行中途中断的线程（不追加输入）；空闲或挂起的线程原样返回
    pub async fn recover(&self, thread_id: &str) -> Result<ExecutionState, EngineError> {
        self.with_thread_lock(thread_id, self.recover_locked(thread_id))
            .await
    }

    async fn recover_locked(&self, thread_id: &str) -> Result<ExecutionState, EngineError> {
        let state = self
            .store
            .load(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))?;

        if state.status() != RunStatus::Interrupted {
            return Ok(state);
        }
        tracing::info!(thread_id, step = state.step, next = %state.next, "recover");
        self.drive(state, None).await
    }

    /// 只读快照
    pub async fn get_state(&self, thread_id: &str) -> Result<ExecutionState, EngineError> {
        self.store
            .load(thread_id)
            .await?
            .ok_or_else(|| EngineError::ThreadNotFound(thread_id.to_string()))
    }

    pub async fn history(&self, thread_id: &str) -> Result<Vec<CheckpointRecord>, EngineError> {
        Ok(self.store.history(thread_id).await?)
    }

    pub async fn pending_threads(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.store.pending_threads().await?)
    }

    async fn drive(
        &self,
        mut state: ExecutionState,
        mut resume: Option<String>,
    ) -> Result<ExecutionState, EngineError> {
        let mut executed = 0usize;

        while !state.next.is_marker() {
            if executed >= self.max_steps {
                tracing::warn!(thread_id = %state.thread_id, limit = self.max_steps, "step limit reached");
                return Err(EngineError::StepLimitExceeded {
                    thread_id: state.thread_id.clone(),
                    limit: self.max_steps,
                });
            }

            let node_id = state.next;
            let node = self.graph.node(node_id)?;
            let answer = resume.take();
            let ctx = NodeContext {
                thread_id: &state.thread_id,
                resume: answer.as_deref(),
            };

            tracing::info!(thread_id = %state.thread_id, node = %node_id, step = state.step, "executing node");
            let outcome = node.run(&state, ctx).await?;

            let mut next = state.clone();
            let seen = next.messages().len();
            if answer.is_some() {
                next.pending_interrupt = None;
            }
            next.apply(outcome.delta);
            next.last_node = Some(node_id);

            match outcome.suspend {
                Some(payload) => {
                    if !self.graph.is_interruptible(node_id) {
                        return Err(EngineError::UnexpectedSuspend(node_id));
                    }
                    next.pending_interrupt = Some(PendingInterrupt::new(node_id, payload));
                }
                None => {
                    next.next = outcome
                        .goto
                        .or_else(|| self.graph.successor(node_id, &next))
                        .unwrap_or(NodeId::End);
                }
            }

            let expected = state.step;
            next.step = expected + 1;
            self.store.save(&next, expected).await.map_err(|e| {
                tracing::warn!(thread_id = %next.thread_id, step = next.step, error = %e, "checkpoint write failed");
                EngineError::from(e)
            })?;
            tracing::debug!(thread_id = %next.thread_id, step = next.step, node = %node_id, "checkpoint written");

            for message in next.transcript().since(seen) {
                self.emit(EngineEvent::Message {
                    thread_id: next.thread_id.clone(),
                    message: message.clone(),
                });
            }
            self.emit(EngineEvent::NodeCompleted {
                thread_id: next.thread_id.clone(),
                node: node_id,
                step: next.step,
            });

            state = next;
            executed += 1;

            if let Some(pending) = &state.pending_interrupt {
                self.emit(EngineEvent::Suspended {
                    thread_id: state.thread_id.clone(),
                    payload: pending.payload.clone(),
                });
                return Ok(state);
            }
        }

        self.emit(EngineEvent::Finished {
            thread_id: state.thread_id.clone(),
        });
        Ok(state)
    }
}
