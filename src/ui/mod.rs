//! 终端前端：用户侧轮询聊天循环与管理员侧单次处理
//!
//! 两者对输入输出泛型（AsyncBufRead / AsyncWrite），二进制里接 stdin / stdout，测试里接内存缓冲。

pub mod admin;
pub mod chat;

pub use admin::{list_pending, run_admin, AdminOutcome};
pub use chat::{is_quit, render_message, run_chat};
