use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::BoxFuture;
use netdev::{Conn, Listener, Net};

/// 用例之间共享的连接对象类型。
pub type DynConn = Arc<dyn Conn>;

/// 拆除函数：关闭两端连接以及背后的监听器，忽略重复关闭产生的错误。
pub type Teardown = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// 一对互相连通的连接：写入 `c1` 的字节从 `c2` 读出，反之亦然。
pub struct ConnPair {
    pub c1: DynConn,
    pub c2: DynConn,
    pub teardown: Teardown,
}

/// 连接对工厂。
///
/// # 教案级注释
///
/// ## 契约（What）
/// - 每次调用 [`PairFactory::make_pair`] 都返回全新的连接对，用例之间互不共享状态；
/// - `teardown` 必须释放工厂为这一对分配的全部资源，且在连接已被用例关闭时仍可安全调用；
/// - [`PairFactory::copy_chunk`] 决定用例批量搬运数据时的块大小，至少为 1024 字节。
#[async_trait]
pub trait PairFactory: Send + Sync {
    async fn make_pair(&self) -> anyhow::Result<ConnPair>;

    fn copy_chunk(&self) -> usize {
        crate::support::DEFAULT_CHUNK
    }
}

/// 基于 `listen` + `dial` 构造连接对的通用工厂，适用于任何支持流式监听的后端。
#[derive(Clone, Debug)]
pub struct ListenerPairFactory {
    net: Net,
    network: String,
    address: String,
}

impl ListenerPairFactory {
    pub fn new(net: Net, network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            net,
            network: network.into(),
            address: address.into(),
        }
    }

    pub fn net(&self) -> &Net {
        &self.net
    }
}

#[async_trait]
impl PairFactory for ListenerPairFactory {
    async fn make_pair(&self) -> anyhow::Result<ConnPair> {
        let listener = self
            .net
            .listen(&self.network, &self.address)
            .await
            .with_context(|| format!("listen {} {}", self.network, self.address))?;
        let target = listener.local_addr().to_string();

        // 任一侧失败都要让另一侧立即返回：拨号失败时 accept 永远等不到连接。
        let dial = async {
            self.net
                .dial(&self.network, &target)
                .await
                .with_context(|| format!("dial {} {target}", self.network))
        };
        let accept = async { listener.accept().await.context("accept") };
        let (c1, accepted) = match tokio::try_join!(dial, accept) {
            Ok(joined) => joined,
            Err(error) => {
                let _ = listener.close();
                return Err(error);
            }
        };
        let c2: DynConn = Arc::new(accepted);

        Ok(ConnPair {
            teardown: teardown(c1.clone(), c2.clone(), Some(listener)),
            c1,
            c2,
        })
    }

    fn copy_chunk(&self) -> usize {
        self.net.config().copy_chunk.max(crate::support::DEFAULT_CHUNK)
    }
}

fn teardown(c1: DynConn, c2: DynConn, listener: Option<Listener>) -> Teardown {
    Box::new(move || {
        Box::pin(async move {
            let _ = c1.close();
            let _ = c2.close();
            if let Some(listener) = listener {
                let _ = listener.close();
            }
        })
    })
}
