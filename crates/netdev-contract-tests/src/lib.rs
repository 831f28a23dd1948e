//! netdev 连接一致性测试套件（TCK）入口。
//!
//! # 教案式综述（Why / How / What）
//! - **为什么存在**：任何传输后端都必须在截止时间、并发关闭与数据完整性上表现得像内核套接字。
//!   本 crate 把这些要求固化为与后端无关的黑盒用例，后端只需提供一个“连接对工厂”即可自测。
//! - **如何集成**：在后端 crate 的 `tests` 目录下对一个模块标注 `#[netdev_tck(factory = 工厂函数)]`，
//!   宏会为每个用例注入一个多线程 `#[tokio::test]`；也可以直接调用 [`run_case`] / [`run_all`]。
//! - **测试对象**：经由 [`PairFactory`] 产出的一对连接，写入一端的字节从另一端读出。
//!
//! # 契约说明（What）
//! - 每个用例使用独立的连接对，并受墙钟上限约束（默认一分钟）；超出上限的用例被中止、
//!   连接对被拆除，并以 [`CaseError::Hung`] 报告，与断言失败 [`CaseError::Failed`] 相区分；
//! - 用例清单：`basic_io`、`ping_pong`、`racy_read`、`racy_write`、`read_timeout`、`write_timeout`、
//!   `past_timeout`、`present_timeout`、`future_timeout`、`close_timeout`、`concurrent_methods`。
//!
//! # 风险提示（Trade-offs）
//! - 用例可能出现假阴性：部分竞态只有在多次运行后才会暴露，建议在 CI 中重复执行。

mod case;
mod concurrency;
mod io;
pub mod logging;
mod pair;
mod support;
mod timeout;

use std::time::Duration;

pub use case::{CaseError, CaseFuture, DEFAULT_CEILING, Session, TckCase, run_case};
pub use netdev_contract_tests_macros::netdev_tck;
pub use pair::{ConnPair, DynConn, ListenerPairFactory, PairFactory, Teardown};
pub use support::DEFAULT_CHUNK;

const ALL_CASES: [TckCase; 11] = [
    TckCase {
        name: "basic_io",
        run: io::basic_io,
    },
    TckCase {
        name: "ping_pong",
        run: io::ping_pong,
    },
    TckCase {
        name: "racy_read",
        run: io::racy_read,
    },
    TckCase {
        name: "racy_write",
        run: io::racy_write,
    },
    TckCase {
        name: "read_timeout",
        run: timeout::read_timeout,
    },
    TckCase {
        name: "write_timeout",
        run: timeout::write_timeout,
    },
    TckCase {
        name: "past_timeout",
        run: timeout::past_timeout,
    },
    TckCase {
        name: "present_timeout",
        run: timeout::present_timeout,
    },
    TckCase {
        name: "future_timeout",
        run: timeout::future_timeout,
    },
    TckCase {
        name: "close_timeout",
        run: timeout::close_timeout,
    },
    TckCase {
        name: "concurrent_methods",
        run: concurrency::concurrent_methods,
    },
];

/// 返回全部用例，顺序与宏默认展开顺序一致。
pub fn all_cases() -> &'static [TckCase] {
    &ALL_CASES
}

/// 按名称查找用例。
pub fn find_case(name: &str) -> Option<&'static TckCase> {
    ALL_CASES.iter().find(|case| case.name == name)
}

/// 依次运行全部用例，遇到第一个失败即返回。
pub async fn run_all<F>(factory: &F, ceiling: Duration) -> Result<(), CaseError>
where
    F: PairFactory + ?Sized,
{
    for case in all_cases() {
        run_case(factory, case, ceiling).await?;
    }
    Ok(())
}

/// 宏生成的测试入口：以默认上限运行指定用例，失败时附带上下文 panic。
pub async fn run_named<F>(factory: &F, name: &str)
where
    F: PairFactory + ?Sized,
{
    logging::init();
    let Some(case) = find_case(name) else {
        panic!("[netdev-tck::{name}] 未知用例");
    };
    if let Err(error) = run_case(factory, case, DEFAULT_CEILING).await {
        panic!("[netdev-tck::{name}] 测试失败：{error}");
    }
}
