//! 退出信号处理
//!
//! 两个前端循环都在 select! 里监听同一个 CancellationToken：
//! Ctrl-C 触发取消，正在等待的轮询 / 读行立即返回。
//! 已写入的 checkpoint 不受影响，下次启动从同一状态继续。

use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// 安装 Ctrl-C 处理
    pub fn install_signal_handlers(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, shutting down");
                manager.shutdown();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_cancels_every_token() {
        let manager = ShutdownManager::new();
        let first = manager.token();
        let second = manager.clone().token();
        assert!(!first.is_cancelled());

        manager.shutdown();

        first.cancelled().await;
        assert!(second.is_cancelled());
    }
}
