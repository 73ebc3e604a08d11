//! 工具执行器
//!
//! 持有 ToolRegistry 与统一超时，execute(tool_name, args) 在超时内调用工具，
//! 失败或超时转为 EngineError；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::EngineError;
use crate::tools::{Tool, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；未注册返回 UnknownTool，超时返回 ToolTimeout，工具返回 Err 则转为 ToolFailed
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, EngineError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| EngineError::UnknownTool(tool_name.to_string()))?;

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(reason)) => Err(EngineError::ToolFailed {
                tool: tool_name.to_string(),
                reason,
            }),
            Err(_) => Err(EngineError::ToolTimeout(tool_name.to_string())),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::HumanHelpTool;

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(HumanHelpTool);
        ToolExecutor::new(registry, 5)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = executor()
            .execute("shell", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTool(name) if name == "shell"));
    }

    #[tokio::test]
    async fn test_tool_failure_is_mapped() {
        let err = executor()
            .execute("human_help", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ToolFailed { .. }));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({ "query": "x".repeat(500) });
        assert!(args_preview(&long).ends_with("..."));
    }
}
