//! 同步原语模块
//!
//! - `BoundedChannel`: 运行时容量的有界 FIFO 消息队列 (多发送者, 多接收者)
//! - `CriticalBlockingMutex`: 临界区互斥锁别名
//! - `AtomicCounter`: 无锁统计计数器

pub mod channel;
pub mod primitives;

pub use channel::{AllocationError, BoundedChannel, Full, ReceiveFuture, ReceiveOutcome};
pub use primitives::{AtomicCounter, CriticalBlockingMutex};
