//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! - MockLlmClient：按规则应答。用户提到退款 / 人工 / help 时输出 human_help 工具调用；
//!   最后一条是管理员处理备注时转述给用户；其余情况回显。
//! - ScriptedLlmClient：按预设队列依次返回输出或错误，并统计调用次数。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};
use crate::workflow::RESOLUTION_PREFIX;

const ESCALATION_KEYWORDS: [&str; 5] = ["refund", "human", "help", "人工", "退款"];

/// Mock 客户端：规则应答
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last = messages.iter().rev().find(|m| m.seq > 0);

        // 只转述管理员备注；工具失败等其他系统备注按普通流程处理
        if let Some(answer) = last
            .filter(|m| m.role == Role::System)
            .and_then(|m| m.content.strip_prefix(RESOLUTION_PREFIX))
        {
            return Ok(format!("Our support team got back to you: {answer}"));
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        let lower = last_user.to_lowercase();
        if ESCALATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            let call = serde_json::json!({
                "tool": "human_help",
                "args": { "query": last_user }
            });
            return Ok(call.to_string());
        }

        Ok(format!("Echo from Mock: {last_user}"))
    }
}

/// 预设脚本客户端：每次 complete 弹出队首；队列耗尽时返回 Api 错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息列表
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        self.script
            .lock()
            .map_err(|_| LlmError::Api("script poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Api("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Transcript;

    fn history(msgs: Vec<Message>) -> Vec<Message> {
        let mut t = Transcript::new();
        for m in msgs {
            t.append(m);
        }
        t.messages().to_vec()
    }

    #[tokio::test]
    async fn test_mock_escalates_on_refund() {
        let out = MockLlmClient
            .complete(&history(vec![Message::user("I need a refund")]))
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["tool"], "human_help");
        assert_eq!(v["args"]["query"], "I need a refund");
    }

    #[tokio::test]
    async fn test_mock_relays_resolution() {
        let out = MockLlmClient
            .complete(&history(vec![
                Message::user("refund please"),
                Message::system("Admin resolved this: approved"),
            ]))
            .await
            .unwrap();
        assert!(out.ends_with("approved"));
        assert!(!out.contains("Admin resolved this"));
    }

    #[tokio::test]
    async fn test_mock_ignores_other_system_notes() {
        let out = MockLlmClient
            .complete(&history(vec![
                Message::user("What are your hours?"),
                Message::system("Tool call failed: unknown tool: shell"),
            ]))
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: What are your hours?");
    }

    #[tokio::test]
    async fn test_mock_echoes_otherwise() {
        let out = MockLlmClient
            .complete(&history(vec![Message::user("What are your hours?")]))
            .await
            .unwrap();
        assert_eq!(out, "Echo from Mock: What are your hours?");
    }

    #[tokio::test]
    async fn test_scripted_exhausted_is_error() {
        let client = ScriptedLlmClient::new(vec![Ok("one".to_string())]);
        assert_eq!(client.complete(&[]).await.unwrap(), "one");
        assert!(client.complete(&[]).await.is_err());
        assert_eq!(client.calls(), 2);
    }
}
