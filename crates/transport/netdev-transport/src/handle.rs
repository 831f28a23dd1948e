use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::NetError;

/// 后端分配的不透明句柄。
///
/// 句柄只在分配它的后端实例内有意义；同一数值在不同后端之间没有任何关联。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub const fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 后端私有的句柄侧表。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 后端以整数句柄对外暴露资源，真实对象保存在侧表中；侧表独占对象的有效性判断，
///   套接字层无法绕过它访问已释放的资源。
///
/// ## 契约（What）
/// - [`HandleTable::insert`] 分配一个当前未被占用的非零句柄；
/// - [`HandleTable::get`] / [`HandleTable::remove`] 对未知或已移除的句柄返回
///   [`ErrorKind::InvalidHandle`](crate::ErrorKind::InvalidHandle)；
/// - 句柄计数单调递增，回绕时跳过仍在使用的数值，因此刚关闭的句柄不会被立即复用。
///
/// ## 逻辑（How）
/// - `parking_lot::Mutex<HashMap>` 保存条目，值以 `Arc<T>` 形式返回，使进行中的 IO 在
///   `remove` 之后仍能安全持有对象直到自身结束；
/// - 计数器使用 `AtomicU32`，分配时在锁内做占用检查。
pub struct HandleTable<T> {
    entries: Mutex<HashMap<Handle, Arc<T>>>,
    next: AtomicU32,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next: AtomicU32::new(1),
        }
    }

    pub fn insert(&self, value: T) -> Handle {
        self.insert_arc(Arc::new(value))
    }

    pub fn insert_arc(&self, value: Arc<T>) -> Handle {
        let mut entries = self.entries.lock();
        loop {
            let raw = self.next.fetch_add(1, Ordering::Relaxed);
            if raw == 0 {
                continue;
            }
            let handle = Handle(raw);
            if let std::collections::hash_map::Entry::Vacant(slot) = entries.entry(handle) {
                slot.insert(value);
                return handle;
            }
        }
    }

    pub fn get(&self, handle: Handle) -> Result<Arc<T>, NetError> {
        self.entries
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| NetError::invalid_handle(handle))
    }

    pub fn remove(&self, handle: Handle) -> Result<Arc<T>, NetError> {
        self.entries
            .lock()
            .remove(&handle)
            .ok_or_else(|| NetError::invalid_handle(handle))
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("live", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn removed_handle_is_rejected() {
        let table = HandleTable::new();
        let handle = table.insert("socket");
        assert_eq!(*table.get(handle).unwrap(), "socket");

        table.remove(handle).unwrap();
        assert_eq!(table.get(handle).unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(
            table.remove(handle).unwrap_err().kind(),
            ErrorKind::InvalidHandle
        );
        assert!(table.is_empty());
    }

    #[test]
    fn handles_are_not_reused_immediately() {
        let table = HandleTable::new();
        let first = table.insert(1u8);
        table.remove(first).unwrap();
        let second = table.insert(2u8);
        assert_ne!(first, second);
    }

    #[test]
    fn counter_wrap_skips_zero_and_live_handles() {
        let table = HandleTable::new();
        let live = table.insert(0u8);
        table.next.store(u32::MAX, Ordering::Relaxed);
        let a = table.insert(1u8);
        assert_eq!(a.as_raw(), u32::MAX);
        // 回绕后跳过 0，且 1 号仍被占用。
        let b = table.insert(2u8);
        assert_eq!(live.as_raw(), 1);
        assert_eq!(b.as_raw(), 2);
    }
}
