//! 可挂起、可跨进程恢复的对话工作流
//!
//! - **types**: 执行状态、节点标识、状态增量
//! - **graph** / **builder**: 有向图与构建校验
//! - **node**: decide / tool / human 三个节点
//! - **interrupt**: 节点内挂起原语
//! - **checkpoint**: SQLite 持久化
//! - **engine**: invoke / resume / get_state

pub mod builder;
pub mod checkpoint;
pub mod engine;
pub mod graph;
pub mod interrupt;
pub mod node;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{human_handoff_graph, WorkflowBuilder};
pub use checkpoint::{CheckpointRecord, CheckpointStore, SqliteCheckpointStore, StoreError};
pub use engine::{EngineEvent, WorkflowEngine};
pub use graph::{Condition, Edge, WorkflowGraph};
pub use interrupt::{interrupt, Suspend};
pub use node::{DecideNode, HumanNode, Node, NodeContext, ToolNode, RESOLUTION_PREFIX};
pub use types::*;
