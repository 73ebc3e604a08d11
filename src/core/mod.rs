//! 核心：引擎错误与退出处理

pub mod error;
pub mod shutdown;

pub use error::EngineError;
pub use shutdown::ShutdownManager;
