use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use crate::agent::Planner;
use crate::llm::{LlmClient, LlmError, ScriptedLlmClient};
use crate::tools::{HumanHelpTool, ToolExecutor, ToolRegistry};
use crate::workflow::{human_handoff_graph, SqliteCheckpointStore, WorkflowEngine, WorkflowGraph};

pub(crate) fn graph_with(llm: Arc<dyn LlmClient>) -> WorkflowGraph {
    let mut registry = ToolRegistry::new();
    registry.register(HumanHelpTool);
    let planner = Planner::with_tools(llm, &registry);
    human_handoff_graph(Arc::new(planner), Arc::new(ToolExecutor::new(registry, 5)))
        .expect("handoff graph")
}

pub(crate) fn handoff_graph() -> WorkflowGraph {
    graph_with(Arc::new(ScriptedLlmClient::default()))
}

pub(crate) fn engine_with(dir: &TempDir, llm: Arc<dyn LlmClient>) -> WorkflowEngine {
    let store = SqliteCheckpointStore::open(dir.path().join("cp.db"), Duration::from_secs(5))
        .expect("open store");
    WorkflowEngine::new(graph_with(llm), Arc::new(store))
}

/// 模型输出：请求 human_help
pub(crate) fn escalate(query: &str) -> Result<String, LlmError> {
    Ok(json!({ "tool": "human_help", "args": { "query": query } }).to_string())
}
