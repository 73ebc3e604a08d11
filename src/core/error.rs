//! 引擎错误类型
//!
//! invoke / resume / get_state 的全部失败都以 EngineError 返回给直接调用方；
//! 节点失败时已持久化的 checkpoint 保持不变，同一调用可直接重试。

use thiserror::Error;

use crate::llm::LlmError;
use crate::workflow::{NodeId, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    /// 外部决策步骤（LLM）失败：网络、超时、输出无法解析
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("thread {0} has no pending interrupt")]
    NoPendingInterrupt(String),

    #[error("thread {0} not found")]
    ThreadNotFound(String),

    /// 线程已挂起等待管理员，不接受新的用户输入
    #[error("thread {0} is waiting for an operator")]
    InterruptPending(String),

    #[error("checkpoint store unavailable: {0}")]
    StoreUnavailable(String),

    /// 其他写者（另一进程）已推进该线程的 checkpoint
    #[error("thread {thread_id} was modified concurrently (expected step {expected}, found {found})")]
    Conflict {
        thread_id: String,
        expected: u64,
        found: u64,
    },

    #[error("corrupt checkpoint: {0}")]
    CorruptState(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool {tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("tool {0} timed out")]
    ToolTimeout(String),

    #[error("node {0} is not allowed to suspend")]
    UnexpectedSuspend(NodeId),

    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error("thread {thread_id} exceeded {limit} node executions in one call")]
    StepLimitExceeded { thread_id: String, limit: usize },
}

impl From<LlmError> for EngineError {
    fn from(err: LlmError) -> Self {
        EngineError::CollaboratorUnavailable(err.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict {
                thread_id,
                expected,
                found,
            } => EngineError::Conflict {
                thread_id,
                expected,
                found,
            },
            StoreError::Corrupt(msg) => EngineError::CorruptState(msg),
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
        }
    }
}

impl EngineError {
    /// 面向用户的“无事可做”类错误，不应视为致命
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            EngineError::NoPendingInterrupt(_) | EngineError::InterruptPending(_)
        )
    }
}
