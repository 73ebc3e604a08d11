//! Planner：agent 决策步
//!
//! 把系统指令 + 完整对话历史交给 LLM，再把输出解析为直接回复或工具调用。
//! 工具调用协议是一个 JSON 对象：{"tool": "human_help", "args": {"query": "..."}}。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::EngineError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::{tool_call_schema_json, ToolRegistry};
use crate::workflow::ToolCall;

/// 固定系统指令
pub const SYSTEM_INSTRUCTION: &str = "If user needs help, call human_help tool.";

/// 决策结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 直接回复用户
    Reply(String),
    /// 请求工具；reply 为工具调用前的可选说明文字
    ToolCall {
        reply: Option<String>,
        call: ToolCall,
    },
}

/// decide 节点依赖的协作者（构造时注入，测试里可替换为脚本化实现）
#[async_trait]
pub trait Collaborator: Send + Sync {
    async fn decide(&self, history: &[Message]) -> Result<Decision, EngineError>;
}

/// 解析 LLM 输出：```json 块或首尾花括号之间的内容视为工具调用，否则为直接回复
pub fn parse_llm_output(output: &str) -> Result<Decision, EngineError> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(EngineError::CollaboratorUnavailable(
            "empty model output".to_string(),
        ));
    }

    let (prefix, json_str) = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim());
        (&trimmed[..start], body)
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => (&trimmed[..start], &trimmed[start..=end]),
            _ => return Ok(Decision::Reply(trimmed.to_string())),
        }
    };

    match serde_json::from_str::<ToolCall>(json_str) {
        Ok(call) if !call.tool.trim().is_empty() => {
            let prefix = prefix.trim();
            Ok(Decision::ToolCall {
                reply: (!prefix.is_empty()).then(|| prefix.to_string()),
                call,
            })
        }
        Ok(_) => Ok(Decision::Reply(trimmed.to_string())),
        // 明显想调用工具但 JSON 坏掉
        Err(e) if json_str.contains("\"tool\"") => Err(EngineError::CollaboratorUnavailable(
            format!("malformed tool call: {}: {}", e, json_str),
        )),
        Err(_) => Ok(Decision::Reply(trimmed.to_string())),
    }
}

/// 组装系统提示：固定指令 + 可用工具 + 调用格式
pub fn build_system_prompt(registry: &ToolRegistry) -> String {
    format!(
        "{SYSTEM_INSTRUCTION}\n\n\
         Available tools:\n{}\n\n\
         To call a tool, reply with exactly one JSON object matching this schema and nothing else:\n{}\n\n\
         Otherwise answer the user in plain text.",
        registry.to_schema_json(),
        tool_call_schema_json(),
    )
}

/// Planner：持有 LLM 与 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn with_tools(llm: Arc<dyn LlmClient>, registry: &ToolRegistry) -> Self {
        Self::new(llm, build_system_prompt(registry))
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[async_trait]
impl Collaborator for Planner {
    async fn decide(&self, history: &[Message]) -> Result<Decision, EngineError> {
        let mut request = Vec::with_capacity(history.len() + 1);
        request.push(Message::system(self.system_prompt.clone()));
        request.extend_from_slice(history);

        let output = self.llm.complete(&request).await?;
        tracing::debug!(chars = output.len(), "model output received");
        parse_llm_output(&output)
    }
}
