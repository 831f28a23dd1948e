use tokio::sync::watch;

/// 一次性、多观察者的关闭信号。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 关闭必须能打断其他任务中已经阻塞的读写与 accept；把“已关闭”建模为可等待的状态，
///   阻塞中的操作与它竞速即可在关闭时立即返回。
///
/// ## 契约（What）
/// - [`CloseSignal::close`] 只有第一次调用返回 `true`，并发调用中恰好一个赢家；
/// - [`CloseSignal::closed`] 在信号已触发时立即完成，否则挂起直到触发，不会丢失唤醒。
///
/// ## 逻辑（How）
/// - 基于 `tokio::sync::watch`：发送端常驻于信号内部，`send_replace` 原子地交换旧值；
///   等待方每次订阅后用 `wait_for` 先检查当前值再挂起。
#[derive(Debug)]
pub struct CloseSignal {
    tx: watch::Sender<bool>,
}

impl CloseSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// 触发关闭；返回是否为首次触发。
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// 等待关闭信号。
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        // 发送端由 self 持有，wait_for 不会因发送端被丢弃而失败。
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseSignal {
    fn default() -> Self {
        Self::new()
    }
}
