//! 同步原语封装
//!
//! 统一使用 `CriticalSectionRawMutex`, 以确保在 ESP32-S3 中断执行器之间
//! (不同优先级任务互相抢占) 访问共享状态的正确性

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

// ===== 类型别名: 简化使用 =====

/// 临界区阻塞互斥锁 - 保护极短的同步临界区
///
/// 持锁期间禁用中断, 因此高优先级执行器上的任务不会在持锁期间抢占进来。
/// 闭包内不能执行任何异步操作或长时间计算。
///
/// # Example
/// ```ignore
/// use core::cell::RefCell;
///
/// let state: CriticalBlockingMutex<RefCell<u32>> = CriticalBlockingMutex::new(RefCell::new(0));
/// state.lock(|cell| *cell.borrow_mut() += 1);
/// ```
pub type CriticalBlockingMutex<T> = Mutex<CriticalSectionRawMutex, T>;

// ===== 优化的原子操作封装 =====

use portable_atomic::{AtomicU64, Ordering};

/// 原子计数器 - 用于统计和序列号
///
/// 只保证单个计数器的原子性, 多个计数器之间的快照不是一致的
pub struct AtomicCounter {
    count: AtomicU64,
}

impl AtomicCounter {
    /// 创建新的计数器
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// 增加并返回新值
    #[inline(always)]
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 增加指定值并返回新值
    #[inline(always)]
    pub fn add(&self, value: u64) -> u64 {
        self.count.fetch_add(value, Ordering::Relaxed) + value
    }

    /// 获取当前值
    #[inline(always)]
    pub fn get(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new()
    }
}
