use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::PortRange;

/// 数据报拨号使用的临时端口分配器。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 未指定本地端口的数据报套接字需要一个临时端口；默认区间取 IANA 动态端口 49152–65535。
///
/// ## 契约（What）
/// - 按区间顺序前进，越过上界后回到下界；
/// - 分配是原子的：并发拨号在区间回绕之前不会拿到相同端口。
///
/// ## 逻辑（How）
/// - 单个 `AtomicU32` 偏移量，`fetch_add` 后对区间长度取模；
/// - 计数器本身在 `u32` 上回绕时，只有区间长度整除 2^32 才能保持严格连续，默认区间（16384）满足该条件。
#[derive(Debug)]
pub struct EphemeralPorts {
    start: u16,
    span: u32,
    offset: AtomicU32,
}

impl EphemeralPorts {
    pub fn new(range: PortRange) -> Self {
        Self {
            start: range.start,
            span: u32::from(range.end.saturating_sub(range.start)) + 1,
            offset: AtomicU32::new(0),
        }
    }

    /// 分配下一个端口。
    pub fn next_port(&self) -> u16 {
        let offset = self.offset.fetch_add(1, Ordering::Relaxed) % self.span;
        // offset < span <= 65536 - start，因此加法不会越界。
        (u32::from(self.start) + offset) as u16
    }
}

impl Default for EphemeralPorts {
    fn default() -> Self {
        Self::new(PortRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn starts_at_range_start_and_wraps() {
        let ports = EphemeralPorts::default();
        assert_eq!(ports.next_port(), 49152);
        assert_eq!(ports.next_port(), 49153);
        ports.offset.store(65535 - 49152, Ordering::Relaxed);
        assert_eq!(ports.next_port(), 65535);
        assert_eq!(ports.next_port(), 49152);
    }

    #[test]
    fn concurrent_allocation_never_collides_before_wrap() {
        let ports = Arc::new(EphemeralPorts::default());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let ports = Arc::clone(&ports);
                std::thread::spawn(move || (0..1000).map(|_| ports.next_port()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for worker in workers {
            for port in worker.join().unwrap() {
                assert!(seen.insert(port), "port {port} handed out twice");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn single_port_range() {
        let ports = EphemeralPorts::new(PortRange { start: 5000, end: 5000 });
        assert_eq!(ports.next_port(), 5000);
        assert_eq!(ports.next_port(), 5000);
    }
}
