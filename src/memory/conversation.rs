//! 对话历史：只追加的消息序列
//!
//! 每条消息带单调递增的序号（seq），写入后不再修改或重排；线程的完整历史随 ExecutionState 一起持久化。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// 系统备注：管理员处理结果等由系统写入的消息，不是用户输入
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 在线程历史中的位置，从 1 开始；未写入历史的临时消息为 0
    #[serde(default)]
    pub seq: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            seq: 0,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// 只追加的对话历史
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条消息并分配下一个序号，返回分配的序号
    pub fn append(&mut self, mut msg: Message) -> u64 {
        let seq = self.last_seq() + 1;
        msg.seq = seq;
        self.messages.push(msg);
        seq
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 第 `count` 条之后的消息（用于“自上次查看以来的新消息”）
    pub fn since(&self, count: usize) -> &[Message] {
        &self.messages[count.min(self.messages.len())..]
    }

    pub fn last_seq(&self) -> u64 {
        self.messages.last().map(|m| m.seq).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
