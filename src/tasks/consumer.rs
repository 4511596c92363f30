//! 排空型消费者
//!
//! 每次循环:
//! 1. 检查队列长度, 非零即报告"队列应为空"(仅为诊断, 依赖于周期/超时常量的选择,
//!    并非队列的结构性保证, 因此从不中止程序)
//! 2. 带超时接收
//! 3. 收到消息则按来源分类并报告; 超时则报告超时 (正常现象)

use core::fmt;

use embassy_time::Duration;
use heapless::Vec;

use crate::config::MAX_PRODUCERS;
use crate::sync::channel::{BoundedChannel, ReceiveOutcome};
use crate::tasks::message::{Message, ProducerIdentity, Provenance};
use crate::tasks::stats::DemoStats;
use crate::util::log::*;

// ===== 报告类型 =====

/// 循环开始时观察到队列非空
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvariantViolation {
    /// 观察到的元素数量
    pub pending: usize,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue should have been empty! ({} pending)", self.pending)
    }
}

/// 一次接收的结果报告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsumerEvent {
    /// 收到消息
    Received {
        message: Message,
        provenance: Provenance,
        /// 该来源在此消息之前丢失的消息数
        lost: u32,
    },
    /// 超时内未收到数据
    TimedOut,
}

impl fmt::Display for ConsumerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received {
                message,
                provenance,
                lost,
            } => {
                write!(
                    f,
                    "Received = {} {} (seq {})",
                    message.value, provenance, message.seq
                )?;
                if *lost > 0 {
                    write!(f, ", {} lost before it", lost)?;
                }
                Ok(())
            }
            Self::TimedOut => write!(f, "Could not receive from the queue"),
        }
    }
}

/// 一次循环的完整结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    pub violation: Option<InvariantViolation>,
    pub event: ConsumerEvent,
}

// ===== 消费者任务 =====

/// 已知来源及其期望的下一个序号
#[derive(Debug, Clone, Copy)]
struct Tracked {
    identity: ProducerIdentity,
    next_seq: u32,
}

/// 排空型消费者
pub struct DrainingConsumer<'a> {
    channel: &'a BoundedChannel<Message>,
    known: Vec<Tracked, MAX_PRODUCERS>,
    timeout: Duration,
    stats: &'a DemoStats,
}

impl<'a> DrainingConsumer<'a> {
    /// 创建消费者
    ///
    /// `known` 中超过 `MAX_PRODUCERS` 的部分被忽略 (其消息按未知来源报告)。
    pub fn new(
        channel: &'a BoundedChannel<Message>,
        known: &[ProducerIdentity],
        timeout: Duration,
        stats: &'a DemoStats,
    ) -> Self {
        let known = known
            .iter()
            .take(MAX_PRODUCERS)
            .map(|identity| Tracked {
                identity: *identity,
                next_seq: 0,
            })
            .collect();

        Self {
            channel,
            known,
            timeout,
            stats,
        }
    }

    /// 执行一次循环
    pub async fn step(&mut self) -> Iteration {
        let pending = self.channel.len();
        let violation = if pending != 0 {
            let violation = InvariantViolation { pending };
            self.stats.violations.increment();
            log_warn!("{}", violation);
            Some(violation)
        } else {
            None
        };

        let event = match self.channel.receive(self.timeout).await {
            ReceiveOutcome::Delivered(message) => self.on_message(message),
            ReceiveOutcome::TimedOut => {
                self.stats.timeouts.increment();
                log_info!("Could not receive from the queue within {}ms", self.timeout.as_millis());
                ConsumerEvent::TimedOut
            }
        };

        Iteration { violation, event }
    }

    fn on_message(&mut self, message: Message) -> ConsumerEvent {
        self.stats.delivered.increment();

        let identities: Vec<ProducerIdentity, MAX_PRODUCERS> =
            self.known.iter().map(|tracked| tracked.identity).collect();
        let provenance = Provenance::classify(&message, &identities);

        let lost = match self
            .known
            .iter_mut()
            .find(|tracked| tracked.identity.id == message.source)
        {
            Some(tracked) => {
                let lost = message.seq.wrapping_sub(tracked.next_seq);
                tracked.next_seq = message.seq.wrapping_add(1);
                lost
            }
            None => {
                self.stats.unknown.increment();
                0
            }
        };
        if lost > 0 {
            self.stats.lost.add(u64::from(lost));
        }

        let event = ConsumerEvent::Received {
            message,
            provenance,
            lost,
        };
        if provenance.is_known() {
            log_info!("{}", event);
        } else {
            log_warn!("{}", event);
        }
        event
    }

    /// 任务主体, 永不返回
    pub async fn run(mut self) -> ! {
        log_info!(
            "Consumer started ({} known sources, timeout {}ms)",
            self.known.len(),
            self.timeout.as_millis()
        );

        loop {
            self.step().await;
        }
    }
}
