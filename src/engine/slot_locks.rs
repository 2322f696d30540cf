// ==========================================
// 门诊号源分配系统 - 时段锁注册表
// ==========================================
// 红线: 每次调用只持有一个时段锁 (单资源获取, 不会跨时段死锁)
// 说明: 注册表锁只在取锁句柄时持有; 同一时段串行, 不同时段并行
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

#[derive(Debug, Default)]
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取 (必要时创建) 时段锁句柄
    fn handle(&self, slot_id: &str) -> Arc<Mutex<()>> {
        // 锁内无共享数据, 中毒后继续使用
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(slot_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 在时段独占区内执行 f
    pub fn with_slot_lock<T>(&self, slot_id: &str, f: impl FnOnce() -> T) -> T {
        let handle = self.handle(slot_id);
        let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(slot_id = %slot_id, "已获取时段锁");
        f()
    }

    /// 已登记的时段数
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
