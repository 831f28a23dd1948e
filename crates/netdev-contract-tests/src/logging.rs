//! 测试进程的日志初始化。

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: Once = Once::new();

/// 安装 `fmt + EnvFilter` 订阅者，进程内只生效一次。
///
/// - 过滤规则取自 `RUST_LOG`，缺省为 `warn`，因此默认只显示被吞掉的失败；
/// - 若外部已经设置了全局订阅者，则保留外部设置，不覆盖。
pub fn init() {
    INIT.call_once(|| {
        if tracing::dispatcher::has_been_set() {
            return;
        }
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
