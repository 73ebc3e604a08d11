//! 工作流类型定义
//!
//! 节点标识、线程执行状态（checkpoint 的内容）、挂起记录、节点输出与状态增量。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{Message, Transcript};

pub type ThreadId = String;

/// 图中的节点标识；Start / End 是隐式标记，不对应可执行节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Start,
    Decide,
    Tool,
    Human,
    End,
}

impl NodeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Start => "start",
            NodeId::Decide => "decide",
            NodeId::Tool => "tool",
            NodeId::Human => "human",
            NodeId::End => "end",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(NodeId::Start),
            "decide" => Some(NodeId::Decide),
            "tool" => Some(NodeId::Tool),
            "human" => Some(NodeId::Human),
            "end" => Some(NodeId::End),
            _ => None,
        }
    }

    /// 是否为隐式标记（不可执行）
    pub fn is_marker(&self) -> bool {
        matches!(self, NodeId::Start | NodeId::End)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM 请求的工具调用（简化 JSON：{"tool": "human_help", "args": {"query": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// human_help 工具产出的升级标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    pub need_human: bool,
    pub query: String,
}

impl EscalationRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            need_human: true,
            query: query.into(),
        }
    }
}

/// tool 节点的执行结果，只在 tool → human 之间存活
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub tool: String,
    pub output: String,
    #[serde(default)]
    pub failed: bool,
}

impl ToolInvocationResult {
    /// 结果是否为升级请求（needHuman == true）
    pub fn escalation(&self) -> Option<EscalationRequest> {
        if self.failed {
            return None;
        }
        serde_json::from_str::<EscalationRequest>(&self.output)
            .ok()
            .filter(|req| req.need_human)
    }
}

/// 挂起记录：线程在 interrupt 节点等待外部输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    /// 挂起所在节点
    pub node: NodeId,
    pub payload: Value,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl PendingInterrupt {
    pub fn new(node: NodeId, payload: Value) -> Self {
        Self {
            node,
            payload,
            resolved: false,
            created_at: Utc::now(),
        }
    }

    /// payload 中的 query 文本
    pub fn query(&self) -> Option<&str> {
        self.payload
            .get("query")
            .and_then(|v| v.as_str())
            .or_else(|| self.payload.as_str())
    }
}

/// 线程运行状态（由 ExecutionState 推导）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// 到达 End 或尚未开始，等待用户输入
    Idle,
    /// 指针停在图中间（上次执行中途失败或进程退出）
    Interrupted,
    /// 等待管理员
    Suspended,
}

/// 线程执行状态：恢复工作流所需的全部信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub thread_id: ThreadId,
    /// 已写入的 checkpoint 序号；0 表示尚未持久化
    pub step: u64,
    /// 下一个要执行的节点
    pub next: NodeId,
    /// 最近一次执行完成的节点
    #[serde(default)]
    pub last_node: Option<NodeId>,
    transcript: Transcript,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub tool_result: Option<ToolInvocationResult>,
    #[serde(default)]
    pub pending_interrupt: Option<PendingInterrupt>,
    pub updated_at: DateTime<Utc>,
}

impl ExecutionState {
    pub fn new(thread_id: impl Into<ThreadId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            step: 0,
            next: NodeId::Start,
            last_node: None,
            transcript: Transcript::new(),
            tool_call: None,
            tool_result: None,
            pending_interrupt: None,
            updated_at: Utc::now(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn push_message(&mut self, msg: Message) -> u64 {
        self.transcript.append(msg)
    }

    pub fn is_suspended(&self) -> bool {
        self.pending_interrupt.is_some()
    }

    pub fn status(&self) -> RunStatus {
        if self.pending_interrupt.is_some() {
            RunStatus::Suspended
        } else if self.next.is_marker() {
            RunStatus::Idle
        } else {
            RunStatus::Interrupted
        }
    }

    /// 合并节点产出的状态增量
    pub fn apply(&mut self, delta: StateDelta) {
        for msg in delta.messages {
            self.transcript.append(msg);
        }
        delta.tool_call.apply_to(&mut self.tool_call);
        delta.tool_result.apply_to(&mut self.tool_result);
        self.updated_at = Utc::now();
    }
}

/// 可选字段的增量操作
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Keep,
    Set(T),
    Clear,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot::Keep
    }
}

impl<T> Slot<T> {
    fn apply_to(self, target: &mut Option<T>) {
        match self {
            Slot::Keep => {}
            Slot::Set(v) => *target = Some(v),
            Slot::Clear => *target = None,
        }
    }
}

/// 节点对状态的修改：追加消息、设置 / 清除工具调用与工具结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub tool_call: Slot<ToolCall>,
    pub tool_result: Slot<ToolInvocationResult>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && matches!(self.tool_call, Slot::Keep)
            && matches!(self.tool_result, Slot::Keep)
    }
}

/// 节点执行结果：状态增量 + 可选挂起信号 + 可选跳转覆盖
#[derive(Debug, Clone, Default)]
pub struct NodeOutcome {
    pub delta: StateDelta,
    /// Some(payload) 表示请求挂起
    pub suspend: Option<Value>,
    /// 覆盖图中的默认边
    pub goto: Option<NodeId>,
}

impl NodeOutcome {
    pub fn proceed(delta: StateDelta) -> Self {
        Self {
            delta,
            ..Default::default()
        }
    }

    pub fn suspend(payload: Value) -> Self {
        Self {
            suspend: Some(payload),
            ..Default::default()
        }
    }
}
