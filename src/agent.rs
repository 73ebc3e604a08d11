//! Agent 运行时装配
//!
//! 两个前端进程（bee-chat / bee-admin）共用这里的装配逻辑：
//! create_llm_from_config 按 API Key 选择后端并包上重试，
//! create_engine 打开共享的 checkpoint 数据库并构建人工接管工作流。

mod planner;

use std::sync::Arc;
use std::time::Duration;

pub use planner::{
    build_system_prompt, parse_llm_output, Collaborator, Decision, Planner, SYSTEM_INSTRUCTION,
};

use crate::config::AppConfig;
use crate::core::EngineError;
use crate::llm::{
    create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, RetryConfig,
    RetryingLlmClient,
};
use crate::tools::{HumanHelpTool, ToolExecutor, ToolRegistry};
use crate::workflow::{human_handoff_graph, SqliteCheckpointStore, WorkflowEngine};

/// 按环境变量与配置选择 LLM：provider = mock 时直接用 Mock；否则 DeepSeek Key 优先，其次 OpenAI，都没有则退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";
    let request_timeout = Duration::from_secs(cfg.llm.timeouts.request);

    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient);
    }

    let inner: Arc<dyn LlmClient> = if use_deepseek {
        tracing::info!(model = ?cfg.llm.model, "Using DeepSeek LLM");
        Arc::new(create_deepseek_client(cfg.llm.model.as_deref(), request_timeout))
    } else if use_openai {
        let model = cfg
            .llm
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(
            OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )
            .with_request_timeout(request_timeout),
        )
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        return Arc::new(MockLlmClient);
    };

    let retry = RetryConfig {
        max_retries: cfg.llm.retry.max_retries,
        base_delay: Duration::from_millis(cfg.llm.retry.base_delay_ms),
        ..RetryConfig::default()
    };
    Arc::new(RetryingLlmClient::new(inner, retry))
}

/// 工作流可用的工具集合
pub fn create_tool_registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(HumanHelpTool);
    tools
}

/// 用给定 LLM 构建引擎（测试与嵌入场景）
pub fn create_engine_with_llm(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<WorkflowEngine, EngineError> {
    let tools = create_tool_registry();
    let planner = Planner::with_tools(llm, &tools);
    let executor = ToolExecutor::new(tools, cfg.tools.tool_timeout_secs);
    let graph = human_handoff_graph(Arc::new(planner), Arc::new(executor))?;

    let store = SqliteCheckpointStore::open(&cfg.store.path, cfg.store.busy_timeout())?;
    tracing::info!(path = %cfg.store.path.display(), "checkpoint store ready");

    Ok(WorkflowEngine::new(graph, Arc::new(store)).with_max_steps(cfg.tools.max_steps))
}

/// 按配置构建引擎：两个进程用同一配置即共享同一份持久化状态
pub fn create_engine(cfg: &AppConfig) -> Result<WorkflowEngine, EngineError> {
    create_engine_with_llm(cfg, create_llm_from_config(cfg))
}
