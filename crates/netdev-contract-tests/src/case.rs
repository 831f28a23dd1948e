use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

use crate::pair::{ConnPair, DynConn, PairFactory};

/// 单个用例的默认墙钟上限。
pub const DEFAULT_CEILING: Duration = Duration::from_secs(60);

/// 用例运行时拿到的连接对。
#[derive(Clone)]
pub struct Session {
    pub c1: DynConn,
    pub c2: DynConn,
    /// 批量搬运的块大小。
    pub chunk: usize,
}

pub type CaseFuture = BoxFuture<'static, anyhow::Result<()>>;

/// 单个一致性用例的元信息。
///
/// # 教案式说明
/// - **意图 (Why)**：以结构体封装用例函数与名称，便于统一遍历、按名称查找与打印上下文；
/// - **逻辑 (How)**：`run` 为普通函数指针，返回装箱的 future，使用例列表可以写成 `const` 数组；
/// - **契约 (What)**：`run` 以 `Err` 报告断言失败，不得 panic；用例内部派生的后台任务必须随返回的 future 一起结束。
#[derive(Clone, Copy)]
pub struct TckCase {
    pub name: &'static str,
    pub run: fn(Session) -> CaseFuture,
}

/// 用例执行失败。
///
/// `Hung` 与 `Failed` 严格区分：前者说明后端没有在截止时间或关闭后及时返回，属于阻塞类缺陷；
/// 后者是普通的断言失败。
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("[{case}] 无法建立连接对：{error:#}")]
    Setup {
        case: &'static str,
        error: anyhow::Error,
    },
    #[error("[{case}] 断言失败：{error:#}")]
    Failed {
        case: &'static str,
        error: anyhow::Error,
    },
    #[error("[{case}] 超过 {ceiling:?} 仍未结束，已强制中止")]
    Hung {
        case: &'static str,
        ceiling: Duration,
    },
}

impl CaseError {
    pub fn case(&self) -> &'static str {
        match self {
            CaseError::Setup { case, .. }
            | CaseError::Failed { case, .. }
            | CaseError::Hung { case, .. } => case,
        }
    }

    pub fn is_hung(&self) -> bool {
        matches!(self, CaseError::Hung { .. })
    }
}

/// 以独立的连接对执行一个用例。
///
/// # 教案式说明
/// - **逻辑 (How)**：
///   1. 在 `ceiling` 内向工厂索取一对新连接；
///   2. 在 `ceiling` 内驱动用例 future，超时即丢弃该 future（其派生的后台任务随之中止）；
///   3. 无论结果如何都执行拆除函数，避免后端句柄泄漏到下一个用例。
/// - **契约 (What)**：建连或用例超时返回 [`CaseError::Hung`]，建连失败返回 [`CaseError::Setup`]，
///   断言失败返回 [`CaseError::Failed`]。
pub async fn run_case<F>(factory: &F, case: &TckCase, ceiling: Duration) -> Result<(), CaseError>
where
    F: PairFactory + ?Sized,
{
    let ConnPair { c1, c2, teardown } = match tokio::time::timeout(ceiling, factory.make_pair()).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(error)) => {
            return Err(CaseError::Setup {
                case: case.name,
                error,
            });
        }
        Err(_) => {
            warn!(case = case.name, ?ceiling, "pair setup exceeded ceiling");
            return Err(CaseError::Hung {
                case: case.name,
                ceiling,
            });
        }
    };
    let session = Session {
        c1,
        c2,
        chunk: factory.copy_chunk(),
    };

    debug!(case = case.name, "running conformance case");
    let outcome = tokio::time::timeout(ceiling, (case.run)(session)).await;
    teardown().await;

    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(CaseError::Failed {
            case: case.name,
            error,
        }),
        Err(_) => {
            warn!(case = case.name, ?ceiling, "case exceeded ceiling; pair torn down");
            Err(CaseError::Hung {
                case: case.name,
                ceiling,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::ListenerPairFactory;
    use async_trait::async_trait;
    use futures::FutureExt;
    use netdev::{Conn, Net};
    use netdev_driver_loopback::{LoopbackConfig, LoopbackDriver};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    fn factory() -> ListenerPairFactory {
        ListenerPairFactory::new(
            Net::new(Arc::new(LoopbackDriver::new())),
            "tcp",
            "127.0.0.1:0",
        )
    }

    fn blocks_forever(session: Session) -> CaseFuture {
        async move {
            let mut buf = [0u8; 8];
            session.c1.read(&mut buf).await?;
            Ok(())
        }
        .boxed()
    }

    fn always_fails(_session: Session) -> CaseFuture {
        async move { Err::<(), _>(anyhow::anyhow!("boom")) }.boxed()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn hung_case_is_reported_distinctly() {
        let case = TckCase {
            name: "blocks_forever",
            run: blocks_forever,
        };
        let err = run_case(&factory(), &case, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_hung());
        assert_eq!(err.case(), "blocks_forever");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn assertion_failure_is_not_hung() {
        let case = TckCase {
            name: "always_fails",
            run: always_fails,
        };
        let err = run_case(&factory(), &case, DEFAULT_CEILING)
            .await
            .unwrap_err();
        assert!(!err.is_hung());
        assert!(err.to_string().contains("boom"));
    }

    fn never_runs(_session: Session) -> CaseFuture {
        async move { Err::<(), _>(anyhow::anyhow!("case must not run without a pair")) }.boxed()
    }

    /// 建连永远不返回的工厂。
    struct StalledFactory;

    #[async_trait]
    impl PairFactory for StalledFactory {
        async fn make_pair(&self) -> anyhow::Result<ConnPair> {
            std::future::pending().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_dial_is_a_setup_error_and_releases_the_listener() {
        // 通配本地地址原样报告给拨号方，拨号因通配远端被拒绝。
        let driver = LoopbackDriver::with_config(LoopbackConfig {
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ..LoopbackConfig::default()
        });
        let factory = ListenerPairFactory::new(Net::new(Arc::new(driver.clone())), "tcp", ":0");
        let case = TckCase {
            name: "never_runs",
            run: never_runs,
        };

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run_case(&factory, &case, Duration::from_secs(1)),
        )
        .await
        .expect("setup failure must not block the harness")
        .unwrap_err();
        assert!(matches!(err, CaseError::Setup { .. }), "{err}");
        assert!(err.to_string().contains("dial tcp"), "{err}");
        assert_eq!(driver.live_handles(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_setup_is_bounded_by_the_ceiling() {
        let case = TckCase {
            name: "never_runs",
            run: never_runs,
        };
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run_case(&StalledFactory, &case, Duration::from_millis(50)),
        )
        .await
        .expect("ceiling must bound pair setup")
        .unwrap_err();
        assert!(err.is_hung());
        assert_eq!(err.case(), "never_runs");
    }
}
