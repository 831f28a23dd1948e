//! 回环后端的一致性测试入口。

use std::sync::Arc;

use netdev::Net;
use netdev_contract_tests::{ListenerPairFactory, netdev_tck};
use netdev_driver_loopback::LoopbackDriver;

fn loopback_pairs() -> ListenerPairFactory {
    ListenerPairFactory::new(Net::new(Arc::new(LoopbackDriver::new())), "tcp", "127.0.0.1:0")
}

#[netdev_tck(factory = loopback_pairs)]
mod loopback {}
