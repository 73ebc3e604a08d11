//! human_help 工具：把“需要人工”编码为数据
//!
//! 没有副作用，只返回 `{"needHuman": true, "query": "..."}`，由 human 节点检查并决定是否挂起。

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;
use crate::workflow::EscalationRequest;

pub const HUMAN_HELP: &str = "human_help";

/// 人工协助工具
pub struct HumanHelpTool;

#[async_trait]
impl Tool for HumanHelpTool {
    fn name(&self) -> &str {
        HUMAN_HELP
    }

    fn description(&self) -> &str {
        "Signals human assistance is needed. Args: {\"query\": \"what the operator should handle\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Request for the human operator" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| "human_help requires a non-empty \"query\"".to_string())?;

        serde_json::to_string(&EscalationRequest::new(query)).map_err(|e| e.to_string())
    }
}
