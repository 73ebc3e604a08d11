//! 记忆层：线程对话历史（只追加）

pub mod conversation;

pub use conversation::{Message, Role, Transcript};
