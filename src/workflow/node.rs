//! 节点抽象与三个内置节点：decide / tool / human
//!
//! 节点只读当前 ExecutionState，返回状态增量和转移信号；写 checkpoint 由引擎负责。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::{Collaborator, Decision};
use crate::core::EngineError;
use crate::memory::Message;
use crate::tools::ToolExecutor;
use crate::workflow::interrupt::interrupt;
use crate::workflow::{ExecutionState, NodeId, NodeOutcome, Slot, StateDelta, ToolInvocationResult};

/// 系统备注前缀：管理员的处理结果以此开头写入历史
pub const RESOLUTION_PREFIX: &str = "Admin resolved this: ";

/// 节点执行上下文
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub thread_id: &'a str,
    /// 仅在 resume 重新进入挂起节点时为 Some
    pub resume: Option<&'a str>,
}

#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(
        &self,
        state: &ExecutionState,
        ctx: NodeContext<'_>,
    ) -> Result<NodeOutcome, EngineError>;
}

/// decide：把完整历史交给协作者（LLM），得到直接回复或工具调用
pub struct DecideNode {
    collaborator: Arc<dyn Collaborator>,
}

impl DecideNode {
    pub fn new(collaborator: Arc<dyn Collaborator>) -> Self {
        Self { collaborator }
    }
}

#[async_trait]
impl Node for DecideNode {
    fn id(&self) -> NodeId {
        NodeId::Decide
    }

    async fn run(
        &self,
        state: &ExecutionState,
        ctx: NodeContext<'_>,
    ) -> Result<NodeOutcome, EngineError> {
        let decision = self.collaborator.decide(state.messages()).await.map_err(|e| {
            tracing::warn!(thread_id = ctx.thread_id, error = %e, "decide step failed");
            e
        })?;

        let delta = match decision {
            Decision::Reply(text) => StateDelta {
                messages: vec![Message::assistant(text)],
                tool_call: Slot::Clear,
                ..Default::default()
            },
            Decision::ToolCall { reply, call } => {
                tracing::info!(thread_id = ctx.thread_id, tool = %call.tool, "collaborator requested tool");
                StateDelta {
                    messages: reply.into_iter().map(Message::assistant).collect(),
                    tool_call: Slot::Set(call),
                    ..Default::default()
                }
            }
        };
        Ok(NodeOutcome::proceed(delta))
    }
}

/// tool：执行 decide 请求的工具；工具失败写入系统备注，让下一轮 decide 看到
pub struct ToolNode {
    executor: Arc<ToolExecutor>,
}

impl ToolNode {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Node for ToolNode {
    fn id(&self) -> NodeId {
        NodeId::Tool
    }

    async fn run(
        &self,
        state: &ExecutionState,
        _ctx: NodeContext<'_>,
    ) -> Result<NodeOutcome, EngineError> {
        let Some(call) = state.tool_call.clone() else {
            return Ok(NodeOutcome::default());
        };

        let mut delta = StateDelta {
            tool_call: Slot::Clear,
            ..Default::default()
        };

        match self.executor.execute(&call.tool, call.args.clone()).await {
            Ok(output) => {
                delta.tool_result = Slot::Set(ToolInvocationResult {
                    tool: call.tool,
                    output,
                    failed: false,
                });
            }
            Err(
                e @ (EngineError::UnknownTool(_)
                | EngineError::ToolFailed { .. }
                | EngineError::ToolTimeout(_)),
            ) => {
                delta
                    .messages
                    .push(Message::system(format!("Tool call failed: {e}")));
                delta.tool_result = Slot::Set(ToolInvocationResult {
                    tool: call.tool,
                    output: e.to_string(),
                    failed: true,
                });
            }
            Err(e) => return Err(e),
        }
        Ok(NodeOutcome::proceed(delta))
    }
}

/// human：检查工具结果，升级请求时挂起；恢复时把管理员答复写成系统备注
#[derive(Debug, Default)]
pub struct HumanNode;

#[async_trait]
impl Node for HumanNode {
    fn id(&self) -> NodeId {
        NodeId::Human
    }

    async fn run(
        &self,
        state: &ExecutionState,
        ctx: NodeContext<'_>,
    ) -> Result<NodeOutcome, EngineError> {
        let payload = match (&state.pending_interrupt, state.tool_result.as_ref().and_then(|r| r.escalation())) {
            (Some(pending), _) => pending.payload.clone(),
            (None, Some(req)) => serde_json::json!({ "query": req.query }),
            (None, None) => {
                return Ok(NodeOutcome::proceed(StateDelta {
                    tool_result: Slot::Clear,
                    ..Default::default()
                }));
            }
        };

        let answer = match interrupt(payload, ctx.resume) {
            Ok(answer) => answer,
            Err(suspend) => {
                tracing::info!(
                    thread_id = ctx.thread_id,
                    query = %suspend.payload["query"],
                    "Paused for admin"
                );
                return Ok(suspend.into());
            }
        };

        Ok(NodeOutcome::proceed(StateDelta {
            messages: vec![Message::system(format!("{RESOLUTION_PREFIX}{answer}"))],
            tool_result: Slot::Clear,
            ..Default::default()
        }))
    }
}
