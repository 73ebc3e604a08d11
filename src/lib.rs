//! Bee Handoff - 可人工接管的对话工作流
//!
//! 模块划分：
//! - **agent**: 决策步（Planner）与引擎装配
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 引擎错误、退出处理
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与重试
//! - **memory**: 对话消息与历史
//! - **observability**: 日志初始化
//! - **tools**: 工具注册表、执行器与 human_help
//! - **ui**: 用户侧聊天循环与管理员侧处理
//! - **workflow**: 工作流图、节点、挂起 / 恢复、checkpoint 存储与执行引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
pub mod ui;
pub mod workflow;

pub use agent::{create_engine, Collaborator, Decision, Planner};
pub use core::EngineError;
pub use workflow::{ExecutionState, NodeId, PendingInterrupt, WorkflowEngine};
