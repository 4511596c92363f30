//! 运行统计
//!
//! 生产者与消费者共享一份 `DemoStats`, 全部字段为无锁原子计数器,
//! 主任务的心跳读取快照并输出。

use core::fmt;

use crate::sync::primitives::AtomicCounter;

/// 共享运行统计
#[derive(Default)]
pub struct DemoStats {
    /// 成功发送
    pub sent: AtomicCounter,
    /// 队列满被拒绝
    pub rejected: AtomicCounter,
    /// 成功接收
    pub delivered: AtomicCounter,
    /// 接收超时
    pub timeouts: AtomicCounter,
    /// 循环开始时队列非空
    pub violations: AtomicCounter,
    /// 来源未知的消息
    pub unknown: AtomicCounter,
    /// 由序号跳变推断出的丢失消息
    pub lost: AtomicCounter,
}

impl DemoStats {
    pub const fn new() -> Self {
        Self {
            sent: AtomicCounter::new(),
            rejected: AtomicCounter::new(),
            delivered: AtomicCounter::new(),
            timeouts: AtomicCounter::new(),
            violations: AtomicCounter::new(),
            unknown: AtomicCounter::new(),
            lost: AtomicCounter::new(),
        }
    }

    /// 读取所有计数器 (各字段单独原子, 整体不是一致快照)
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.get(),
            rejected: self.rejected.get(),
            delivered: self.delivered.get(),
            timeouts: self.timeouts.get(),
            violations: self.violations.get(),
            unknown: self.unknown.get(),
            lost: self.lost.get(),
        }
    }
}

/// `DemoStats` 的普通值拷贝
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatsSnapshot {
    pub sent: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub timeouts: u64,
    pub violations: u64,
    pub unknown: u64,
    pub lost: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} rejected={} delivered={} timeouts={} violations={} unknown={} lost={}",
            self.sent,
            self.rejected,
            self.delivered,
            self.timeouts,
            self.violations,
            self.unknown,
            self.lost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_copies_counters() {
        let stats = DemoStats::new();
        stats.sent.add(3);
        stats.delivered.increment();
        stats.timeouts.increment();

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                sent: 3,
                delivered: 1,
                timeouts: 1,
                ..StatsSnapshot::default()
            }
        );
        assert!(snapshot.to_string().starts_with("sent=3 rejected=0 delivered=1"));
    }
}
