//! 系统初始化
//!
//! 启动流程:
//! 1. 分配队列 (容量 5, 元素为 32 位负载的消息) —— 唯一的初始化失败点
//! 2. 检查优先级布局: 消费者必须严格高于生产者, 保证有数据时消费者立即被调度
//! 3. 依次创建 Sender1 / Sender2 / Receiver 三个任务
//! 4. 把控制权交给调度器 (固件中即返回执行器循环)
//!
//! 任一步失败时调用方报告错误并进入 `halt_safely`, 不创建剩余任务。
//!
//! 调度器本身是外部能力, 通过 `TaskScheduler` trait 注入:
//! 固件实现基于 Embassy 中断执行器, 主机测试使用记录型实现。

use core::fmt;

use embassy_time::Duration;

use crate::config;
use crate::sync::channel::{AllocationError, BoundedChannel};
use crate::tasks::consumer::DrainingConsumer;
use crate::tasks::message::{Message, ProducerIdentity};
use crate::tasks::producer::PeriodicProducer;
use crate::tasks::stats::DemoStats;
use crate::util::log::*;

/// 生产者任务数量
pub const PRODUCER_COUNT: usize = 2;

/// 任务总数 (生产者 + 1 个消费者)
pub const TASK_COUNT: usize = PRODUCER_COUNT + 1;

// ===== 任务描述 =====

/// 静态任务优先级, 数值越大优先级越高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    /// 空闲优先级之上第 `levels` 级
    pub const fn above_idle(levels: u8) -> Self {
        Self(config::IDLE_PRIORITY + levels)
    }
}

/// 任务角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskRole {
    Producer(ProducerIdentity),
    Consumer,
}

/// 任务描述 (启动时创建一次, 之后不变)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: &'static str,
    pub priority: TaskPriority,
    /// 周期 (消费者没有固定周期)
    pub period: Option<Duration>,
    /// 栈预算 (字节), 仅供调度器参考
    pub stack_budget: usize,
    pub role: TaskRole,
}

// ===== 配置 =====

/// 运行时配置, 默认值取自 `config` 常量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoConfig {
    pub queue_capacity: usize,
    pub producer_period: Duration,
    pub receive_timeout: Duration,
    pub producers: [ProducerIdentity; PRODUCER_COUNT],
    pub producer_priority: TaskPriority,
    pub consumer_priority: TaskPriority,
    pub stack_budget: usize,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            queue_capacity: config::QUEUE_LENGTH,
            producer_period: Duration::from_millis(config::PRODUCER_PERIOD_MS),
            receive_timeout: Duration::from_millis(config::RECEIVE_TIMEOUT_MS),
            producers: [
                ProducerIdentity::new(config::PRODUCER_A_VALUE, "producer A"),
                ProducerIdentity::new(config::PRODUCER_B_VALUE, "producer B"),
            ],
            producer_priority: TaskPriority::above_idle(1),
            consumer_priority: TaskPriority::above_idle(2),
            stack_budget: config::TASK_STACK_BUDGET,
        }
    }
}

impl DemoConfig {
    /// 按创建顺序排列的任务表
    pub fn task_table(&self) -> [TaskDescriptor; TASK_COUNT] {
        let producer = |index: usize| TaskDescriptor {
            name: config::PRODUCER_TASK_NAMES[index],
            priority: self.producer_priority,
            period: Some(self.producer_period),
            stack_budget: self.stack_budget,
            role: TaskRole::Producer(self.producers[index]),
        };

        [
            producer(0),
            producer(1),
            TaskDescriptor {
                name: config::CONSUMER_TASK_NAME,
                priority: self.consumer_priority,
                period: None,
                stack_budget: self.stack_budget,
                role: TaskRole::Consumer,
            },
        ]
    }

    fn check_priorities<E>(&self) -> Result<(), StartupError<E>> {
        if self.consumer_priority > self.producer_priority {
            Ok(())
        } else {
            Err(StartupError::PriorityInversion {
                producer: self.producer_priority,
                consumer: self.consumer_priority,
            })
        }
    }
}

// ===== 调度器接口 =====

/// 一个可被调度的任务体
pub enum DemoTask<'a> {
    Producer(PeriodicProducer<'a>),
    Consumer(DrainingConsumer<'a>),
}

impl DemoTask<'_> {
    /// 运行任务, 永不返回
    pub async fn run(self) -> ! {
        match self {
            Self::Producer(producer) => producer.run().await,
            Self::Consumer(consumer) => consumer.run().await,
        }
    }
}

/// 外部调度器: 按描述创建任务
///
/// 实现必须按 `descriptor.priority` 安排抢占关系。
pub trait TaskScheduler<'a> {
    type Error: fmt::Debug;

    fn create_task(&mut self, descriptor: &TaskDescriptor, task: DemoTask<'a>)
        -> Result<(), Self::Error>;
}

// ===== 错误类型 =====

/// 启动失败 (全部为致命错误, 调用方应报告后停机)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupError<E> {
    /// 队列分配失败
    Allocation(AllocationError),
    /// 消费者优先级不高于生产者
    PriorityInversion {
        producer: TaskPriority,
        consumer: TaskPriority,
    },
    /// 调度器拒绝创建任务
    Spawn { task: &'static str, error: E },
}

impl<E: fmt::Debug> fmt::Display for StartupError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation(error) => write!(f, "Unable to create queue: {}", error),
            Self::PriorityInversion { producer, consumer } => write!(
                f,
                "Consumer priority {} must be above producer priority {}",
                consumer.0, producer.0
            ),
            Self::Spawn { task, error } => write!(f, "Unable to create task {}: {:?}", task, error),
        }
    }
}

// ===== 启动 =====

/// 分配队列并创建全部任务
///
/// `place` 把队列放到调用方拥有的存储中 (固件为 `StaticCell`), 返回的共享引用
/// 被注入到每个任务; 队列分配失败时 `place` 不会被调用, 也不会创建任何任务。
pub fn boot<'a, S, P>(
    scheduler: &mut S,
    config: &DemoConfig,
    place: P,
    stats: &'a DemoStats,
) -> Result<&'a BoundedChannel<Message>, StartupError<S::Error>>
where
    S: TaskScheduler<'a>,
    P: FnOnce(BoundedChannel<Message>) -> &'a BoundedChannel<Message>,
{
    let channel =
        BoundedChannel::create(config.queue_capacity).map_err(StartupError::Allocation)?;
    log_debug!("Queue created (capacity {})", channel.capacity());

    config.check_priorities()?;

    let channel = place(channel);
    launch(scheduler, config, channel, stats)?;
    Ok(channel)
}

/// 按任务表创建全部任务, 返回创建的任务数
pub fn launch<'a, S>(
    scheduler: &mut S,
    config: &DemoConfig,
    channel: &'a BoundedChannel<Message>,
    stats: &'a DemoStats,
) -> Result<usize, StartupError<S::Error>>
where
    S: TaskScheduler<'a>,
{
    config.check_priorities()?;

    let table = config.task_table();
    for descriptor in &table {
        let task = match descriptor.role {
            TaskRole::Producer(identity) => DemoTask::Producer(PeriodicProducer::new(
                channel,
                identity,
                config.producer_period,
                stats,
            )),
            TaskRole::Consumer => DemoTask::Consumer(DrainingConsumer::new(
                channel,
                &config.producers,
                config.receive_timeout,
                stats,
            )),
        };

        log_info!(
            "Creating task {} (priority {})",
            descriptor.name,
            descriptor.priority.0
        );
        scheduler
            .create_task(descriptor, task)
            .map_err(|error| StartupError::Spawn {
                task: descriptor.name,
                error,
            })?;
    }

    Ok(table.len())
}

/// 安全停机: 启动失败后停在这里, 不崩溃也不进入未定义状态
pub fn halt_safely() -> ! {
    log_error!("System halted, no tasks running");
    loop {
        core::hint::spin_loop();
    }
}
