//! 工作流构建器
//!
//! 提供流畅的 API 注册节点与边，build 时校验：Start 有且只有普通出边、边的目标都已注册、
//! interrupt 节点已注册。

use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::Collaborator;
use crate::core::EngineError;
use crate::tools::ToolExecutor;
use crate::workflow::graph::{Condition, Edge, WorkflowGraph};
use crate::workflow::node::{DecideNode, HumanNode, Node, ToolNode};
use crate::workflow::NodeId;

#[derive(Default)]
pub struct WorkflowBuilder {
    nodes: HashMap<NodeId, Arc<dyn Node>>,
    edges: HashMap<NodeId, Edge>,
    interrupt_node: Option<NodeId>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点（以 node.id() 为键）
    pub fn node(mut self, node: impl Node + 'static) -> Self {
        self.nodes.insert(node.id(), Arc::new(node));
        self
    }

    pub fn edge(mut self, from: NodeId, to: NodeId) -> Self {
        self.edges.insert(from, Edge::Always(to));
        self
    }

    pub fn conditional_edge(
        mut self,
        from: NodeId,
        condition: Condition,
        then: NodeId,
        otherwise: NodeId,
    ) -> Self {
        self.edges.insert(
            from,
            Edge::When {
                condition,
                then,
                otherwise,
            },
        );
        self
    }

    /// 指定唯一允许挂起的节点
    pub fn interrupt_at(mut self, node: NodeId) -> Self {
        self.interrupt_node = Some(node);
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, EngineError> {
        if let Some(marker) = self.nodes.keys().find(|id| id.is_marker()) {
            return Err(EngineError::InvalidGraph(format!(
                "{marker} is a marker and cannot be a node"
            )));
        }

        match self.edges.get(&NodeId::Start) {
            Some(Edge::Always(_)) => {}
            Some(_) => {
                return Err(EngineError::InvalidGraph(
                    "start edge must be unconditional".to_string(),
                ))
            }
            None => return Err(EngineError::InvalidGraph("missing start edge".to_string())),
        }

        if self.edges.contains_key(&NodeId::End) {
            return Err(EngineError::InvalidGraph("end has no outgoing edges".to_string()));
        }

        for (from, edge) in &self.edges {
            if !from.is_marker() && !self.nodes.contains_key(from) {
                return Err(EngineError::InvalidGraph(format!(
                    "edge from unregistered node {from}"
                )));
            }
            for to in edge.targets() {
                if to == NodeId::Start {
                    return Err(EngineError::InvalidGraph(format!("edge {from} -> start")));
                }
                if to != NodeId::End && !self.nodes.contains_key(&to) {
                    return Err(EngineError::InvalidGraph(format!(
                        "edge {from} -> unregistered node {to}"
                    )));
                }
            }
        }

        for id in self.nodes.keys() {
            if !self.edges.contains_key(id) {
                tracing::warn!(node = %id, "node has no outgoing edge; execution ends after it");
            }
        }

        let interrupt_node = self
            .interrupt_node
            .ok_or_else(|| EngineError::InvalidGraph("no interrupt node".to_string()))?;
        if !self.nodes.contains_key(&interrupt_node) {
            return Err(EngineError::InvalidGraph(format!(
                "interrupt node {interrupt_node} is not registered"
            )));
        }

        Ok(WorkflowGraph {
            nodes: self.nodes,
            edges: self.edges,
            interrupt_node,
        })
    }
}

/// 人工接管工作流：start → decide →(工具调用) tool → human → decide；decide 无工具调用时结束
pub fn human_handoff_graph(
    collaborator: Arc<dyn Collaborator>,
    executor: Arc<ToolExecutor>,
) -> Result<WorkflowGraph, EngineError> {
    WorkflowBuilder::new()
        .node(DecideNode::new(collaborator))
        .node(ToolNode::new(executor))
        .node(HumanNode)
        .edge(NodeId::Start, NodeId::Decide)
        .conditional_edge(
            NodeId::Decide,
            Condition::ToolCallRequested,
            NodeId::Tool,
            NodeId::End,
        )
        .edge(NodeId::Tool, NodeId::Human)
        .edge(NodeId::Human, NodeId::Decide)
        .interrupt_at(NodeId::Human)
        .build()
}
