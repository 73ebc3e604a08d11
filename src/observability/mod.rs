//! 可观测性：tracing 日志写到 stderr，stdout 留给对话输出

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 默认 info，可用 RUST_LOG 覆盖（如 `RUST_LOG=bee_handoff=debug`）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
