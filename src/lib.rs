//! RustRTOS Queue - ESP32-S3 生产者/消费者队列演示库
//!
//! 本库提供以下核心功能:
//! - 运行时容量的有界 FIFO 队列 (非阻塞发送, 带超时接收)
//! - 绝对时间调度的周期性生产者
//! - 带来源分类与空队列诊断的排空型消费者
//! - 固定优先级任务表与启动/停机流程
//! - 条件编译日志系统
//!
//! 库本身不依赖具体芯片, 可在主机上测试; 固件入口见 `main.rs` (feature `esp32s3`)。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod sync;
pub mod system;
pub mod tasks;
pub mod util;

// ===== 重导出常用类型 =====
pub use sync::channel::{AllocationError, BoundedChannel, Full, ReceiveOutcome};
pub use system::{boot, halt_safely, DemoConfig, DemoTask, StartupError, TaskDescriptor, TaskScheduler};
pub use tasks::{DemoStats, DrainingConsumer, Message, PeriodicProducer, ProducerIdentity};

// ===== 版本信息 =====
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// 系统配置常量
pub mod config {
    /// 队列容量
    pub const QUEUE_LENGTH: usize = 5;

    /// 生产者发送周期 (ms)
    pub const PRODUCER_PERIOD_MS: u64 = 200;

    /// 消费者接收超时 (ms)
    pub const RECEIVE_TIMEOUT_MS: u64 = 100;

    /// 生产者 A / B 的身份值
    pub const PRODUCER_A_VALUE: u32 = 100;
    pub const PRODUCER_B_VALUE: u32 = 200;

    /// 生产者任务名
    pub const PRODUCER_TASK_NAMES: [&str; 2] = ["Sender1", "Sender2"];

    /// 消费者任务名
    pub const CONSUMER_TASK_NAME: &str = "Receiver";

    /// 空闲任务优先级; 生产者为 +1, 消费者为 +2
    pub const IDLE_PRIORITY: u8 = 0;

    /// 每个任务的栈预算 (字节)
    pub const TASK_STACK_BUDGET: usize = 1000;

    /// 消费者可跟踪的最大已知来源数
    pub const MAX_PRODUCERS: usize = 4;

    /// 堆大小 (字节), 队列存储从这里分配
    pub const HEAP_SIZE: usize = 32 * 1024;

    /// 心跳输出周期 (s)
    pub const HEARTBEAT_PERIOD_S: u64 = 10;
}
