//! 任务模块
//!
//! 提供队列演示中的任务实现:
//! - `producer`: 周期性生产者 (低优先级, 非阻塞发送)
//! - `consumer`: 排空型消费者 (高优先级, 带超时接收)
//! - `message`: 带来源标签的消息
//! - `stats`: 共享运行统计

pub mod consumer;
pub mod message;
pub mod producer;
pub mod stats;

pub use consumer::{ConsumerEvent, DrainingConsumer, InvariantViolation, Iteration};
pub use message::{Message, ProducerIdentity, Provenance, SourceId};
pub use producer::PeriodicProducer;
pub use stats::{DemoStats, StatsSnapshot};
