//! 工作流图
//!
//! 固定的节点集合与有向边：普通边、条件边，以及唯一允许挂起的 interrupt 节点。
//! 构建后不可变，引擎只读。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::EngineError;
use crate::workflow::node::Node;
use crate::workflow::{ExecutionState, NodeId};

/// 条件边的判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// decide 节点产出了工具调用
    ToolCallRequested,
}

impl Condition {
    pub fn holds(&self, state: &ExecutionState) -> bool {
        match self {
            Condition::ToolCallRequested => state.tool_call.is_some(),
        }
    }
}

/// 出边
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Always(NodeId),
    When {
        condition: Condition,
        then: NodeId,
        otherwise: NodeId,
    },
}

impl Edge {
    pub(crate) fn targets(&self) -> Vec<NodeId> {
        match self {
            Edge::Always(to) => vec![*to],
            Edge::When {
                then, otherwise, ..
            } => vec![*then, *otherwise],
        }
    }
}

/// 工作流图
pub struct WorkflowGraph {
    pub(crate) nodes: HashMap<NodeId, Arc<dyn Node>>,
    pub(crate) edges: HashMap<NodeId, Edge>,
    pub(crate) interrupt_node: NodeId,
}

impl WorkflowGraph {
    pub fn node(&self, id: NodeId) -> Result<Arc<dyn Node>, EngineError> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::InvalidGraph(format!("node {id} is not registered")))
    }

    /// Start 的后继，即每轮用户输入后第一个执行的节点
    pub fn entry(&self) -> NodeId {
        match self.edges.get(&NodeId::Start) {
            Some(Edge::Always(to)) => *to,
            _ => NodeId::End,
        }
    }

    pub fn is_interruptible(&self, id: NodeId) -> bool {
        self.interrupt_node == id
    }

    /// 按出边计算后继；没有出边时返回 None
    pub fn successor(&self, from: NodeId, state: &ExecutionState) -> Option<NodeId> {
        self.edges.get(&from).map(|edge| match edge {
            Edge::Always(to) => *to,
            Edge::When {
                condition,
                then,
                otherwise,
            } => {
                if condition.holds(state) {
                    *then
                } else {
                    *otherwise
                }
            }
        })
    }
}
