//! 中断通道：节点请求外部输入的唯一方式
//!
//! 节点调用 [`interrupt`]：首次执行时没有恢复值，返回 `Err(Suspend)`，节点把它转成挂起输出；
//! 引擎持久化 PendingInterrupt 后返回调用方，不保留任何内存中的 continuation。
//! 之后（可能在另一个进程）resume 以外部输入重新执行同一节点，此时 [`interrupt`] 返回 `Ok(answer)`。

use serde_json::Value;

use crate::workflow::NodeOutcome;

/// 挂起请求：payload 会原样存入 PendingInterrupt
#[derive(Debug, Clone, PartialEq)]
pub struct Suspend {
    pub payload: Value,
}

impl From<Suspend> for NodeOutcome {
    fn from(s: Suspend) -> Self {
        NodeOutcome::suspend(s.payload)
    }
}

/// 请求外部输入：有恢复值则返回它，否则返回挂起请求
pub fn interrupt(payload: Value, resume: Option<&str>) -> Result<String, Suspend> {
    match resume {
        Some(answer) => Ok(answer.to_string()),
        None => Err(Suspend { payload }),
    }
}
