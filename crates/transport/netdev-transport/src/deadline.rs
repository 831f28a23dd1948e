use std::time::Duration;

use tokio::time::Instant;

/// 阻塞操作的截止时间。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 套接字的读、写截止时间彼此独立，且可在操作阻塞期间被其他任务改写；
///   用显式三态枚举代替“零值时间点代表不限时”之类的隐式约定，避免误把“从未设置”当成“早已过期”。
///
/// ## 契约（What）
/// - `None`：不限时阻塞；
/// - `Elapsed`：已过期，效果等同于一个在读取瞬间就到期的时间点，操作应立即以超时返回；
/// - `At(instant)`：等待 IO 完成或该时刻到来，二者先到者生效；时刻早于当前时间时等同 `Elapsed`。
///
/// ## 注意事项（Trade-offs）
/// - 时间基准采用 `tokio::time::Instant`，便于测试中使用暂停时钟；
/// - `Elapsed` 没有具体时刻，[`Deadline::instant`] 对它返回调用当下的时刻。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Deadline {
    #[default]
    None,
    Elapsed,
    At(Instant),
}

impl Deadline {
    /// 以当前时间为基准、`timeout` 之后到期。
    pub fn after(timeout: Duration) -> Self {
        Deadline::At(Instant::now() + timeout)
    }

    pub fn at(instant: Instant) -> Self {
        Deadline::At(instant)
    }

    /// 由可选超时构造；`None` 表示不限时。
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or(Deadline::None, Deadline::after)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Deadline::None)
    }

    pub fn is_elapsed(&self) -> bool {
        match self {
            Deadline::None => false,
            Deadline::Elapsed => true,
            Deadline::At(instant) => *instant <= Instant::now(),
        }
    }

    pub fn instant(&self) -> Option<Instant> {
        match self {
            Deadline::None => None,
            Deadline::Elapsed => Some(Instant::now()),
            Deadline::At(instant) => Some(*instant),
        }
    }

    /// 剩余可等待时长；不限时返回 `None`，已过期返回零。
    pub fn remaining(&self) -> Option<Duration> {
        self.instant()
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    /// 取两者中较早到期的一个。
    pub fn min(self, other: Deadline) -> Deadline {
        match (self, other) {
            (Deadline::None, other) | (other, Deadline::None) => other,
            (Deadline::Elapsed, _) | (_, Deadline::Elapsed) => Deadline::Elapsed,
            (Deadline::At(a), Deadline::At(b)) => Deadline::At(a.min(b)),
        }
    }
}
