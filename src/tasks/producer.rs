//! 周期性生产者
//!
//! 每个周期向队列非阻塞地发送一条带身份标签的消息。队列满只记录错误,
//! 本周期内不重试 (下一个周期的发送就是重试), 发送节奏不受消费者快慢影响。
//!
//! 节拍由 `Ticker` 给出: 第 k 次唤醒在 `t0 + k * period`, 执行时间的波动
//! 不会累积成漂移; 落后时错过的节拍会立即依次到期。

use embassy_time::{Duration, Ticker};

use crate::sync::channel::{BoundedChannel, Full};
use crate::tasks::message::{Message, ProducerIdentity};
use crate::tasks::stats::DemoStats;
use crate::util::log::*;

// ===== 生产者任务 =====

/// 周期性生产者
pub struct PeriodicProducer<'a> {
    channel: &'a BoundedChannel<Message>,
    identity: ProducerIdentity,
    payload: u32,
    period: Duration,
    seq: u32,
    stats: &'a DemoStats,
}

impl<'a> PeriodicProducer<'a> {
    /// 创建生产者, 负载默认等于身份值
    pub fn new(
        channel: &'a BoundedChannel<Message>,
        identity: ProducerIdentity,
        period: Duration,
        stats: &'a DemoStats,
    ) -> Self {
        Self {
            channel,
            identity,
            payload: identity.id.0,
            period,
            seq: 0,
            stats,
        }
    }

    /// 使用自定义负载 (身份仍由 `source` 字段携带)
    pub fn with_payload(mut self, payload: u32) -> Self {
        self.payload = payload;
        self
    }

    /// 一个周期的工作: 尝试发送一条消息, 从不挂起
    ///
    /// 失败的发送同样消耗一个序号, 消费者据此推断丢失的消息。
    pub fn send_once(&mut self) -> Result<(), Full<Message>> {
        let message = Message {
            source: self.identity.id,
            seq: self.seq,
            value: self.payload,
        };
        self.seq = self.seq.wrapping_add(1);

        match self.channel.try_send(message) {
            Ok(()) => {
                self.stats.sent.increment();
                log_trace!("{}: sent seq {}", self.identity.label, message.seq);
                Ok(())
            }
            Err(full) => {
                self.stats.rejected.increment();
                log_error!(
                    "{}: couldn't write to the queue (capacity {})",
                    self.identity.label,
                    self.channel.capacity()
                );
                Err(full)
            }
        }
    }

    /// 任务主体, 永不返回
    pub async fn run(mut self) -> ! {
        log_info!(
            "{} started (source {}, period {}ms)",
            self.identity.label,
            self.identity.id.0,
            self.period.as_millis()
        );

        let mut ticker = Ticker::every(self.period);

        loop {
            // 队列满已在 send_once 中报告, 本周期不重试
            let _ = self.send_once();
            ticker.next().await;
        }
    }
}
