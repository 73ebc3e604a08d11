//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找；
//! tool 节点按 LLM 给出的工具名执行，未注册的工具名视为模型幻觉。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具，返回结果文本（通常是 JSON）
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 工具清单 JSON（name / description / parameters），拼入 system prompt
    pub fn to_schema_json(&self) -> String {
        let mut tools: Vec<(&String, &Arc<dyn Tool>)> = self.tools.iter().collect();
        tools.sort_by(|a, b| a.0.cmp(b.0));
        let tools: Vec<Value> = tools
            .into_iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::HumanHelpTool;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(HumanHelpTool);
        assert!(registry.contains("human_help"));
        assert!(registry.get("shell").is_none());
        assert_eq!(registry.tool_names(), vec!["human_help".to_string()]);
    }

    #[test]
    fn test_schema_json_lists_parameters() {
        let mut registry = ToolRegistry::new();
        registry.register(HumanHelpTool);
        let v: Value = serde_json::from_str(&registry.to_schema_json()).unwrap();
        assert_eq!(v[0]["name"], "human_help");
        assert_eq!(v[0]["parameters"]["required"][0], "query");
    }
}
