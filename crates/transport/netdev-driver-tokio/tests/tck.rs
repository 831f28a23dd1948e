//! 内核套接字后端的一致性测试入口。

use std::sync::Arc;

use netdev::Net;
use netdev_contract_tests::{ListenerPairFactory, netdev_tck};
use netdev_driver_tokio::TokioDriver;

fn kernel_pairs() -> ListenerPairFactory {
    ListenerPairFactory::new(Net::new(Arc::new(TokioDriver::new())), "tcp", "127.0.0.1:0")
}

#[netdev_tck(factory = kernel_pairs)]
mod kernel {}
