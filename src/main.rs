//! RustRTOS Queue - ESP32-S3 生产者/消费者队列演示
//!
//! 一个队列, 两个周期性生产者, 一个消费者:
//! - Sender1 / Sender2: 中优先级执行器 (Priority2), 每 200ms 非阻塞发送一次
//! - Receiver: 高优先级执行器 (Priority3), 带 100ms 超时接收并报告来源
//! - 主执行器 (最低优先级): 每 10s 输出一次统计心跳
//!
//! 消费者所在执行器优先级更高, 有数据时立即抢占生产者, 使队列保持为空。
//!
//! 硬件目标: ESP32-S3-N16R8
//!
//! # 运行
//! ```bash
//! cargo run --release --features dev
//! ```

#![no_std]
#![no_main]

use embassy_executor::{SendSpawner, Spawner};
use embassy_time::{Duration, Ticker};
use esp_hal::{
    interrupt::{software::SoftwareInterruptControl, Priority},
    timer::timg::TimerGroup,
};
use esp_rtos::embassy::InterruptExecutor;
use static_cell::StaticCell;

use rustrtos_queue::system::TaskPriority;
use rustrtos_queue::{
    boot, config, halt_safely, log_error, log_info, timed, BoundedChannel, DemoConfig, DemoStats,
    DemoTask, DrainingConsumer, Message, PeriodicProducer, TaskDescriptor, TaskScheduler, NAME,
    VERSION,
};

esp_bootloader_esp_idf::esp_app_desc!();

// ===== 日志传输 =====
#[cfg(feature = "log-defmt")]
use defmt_rtt as _;

// ===== Panic Handler =====
#[cfg(any(feature = "dev", feature = "log-println"))]
use esp_backtrace as _;

#[cfg(not(any(feature = "dev", feature = "log-println")))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// ===== 静态分配 =====
/// 高优先级执行器 - 消费者
static HIGH_PRIO_EXECUTOR: StaticCell<InterruptExecutor<2>> = StaticCell::new();

/// 中优先级执行器 - 生产者
static MID_PRIO_EXECUTOR: StaticCell<InterruptExecutor<1>> = StaticCell::new();

/// 队列存储位置 (队列本身在启动时从堆上分配)
static CHANNEL: StaticCell<BoundedChannel<Message>> = StaticCell::new();

/// 共享统计
static STATS: DemoStats = DemoStats::new();

// ===== 任务包装 =====

#[embassy_executor::task(pool_size = 2)]
async fn producer_task(producer: PeriodicProducer<'static>) -> ! {
    producer.run().await
}

#[embassy_executor::task]
async fn consumer_task(consumer: DrainingConsumer<'static>) -> ! {
    consumer.run().await
}

// ===== 调度器适配 =====

/// 任务创建失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum EspSpawnError {
    /// 没有对应该优先级的执行器
    NoExecutor(TaskPriority),
    /// 任务池已满
    PoolExhausted,
}

/// 一个优先级对应一个中断执行器
struct PriorityLane {
    priority: TaskPriority,
    spawner: SendSpawner,
}

/// 基于 Embassy 中断执行器的调度器
struct EspScheduler {
    lanes: [PriorityLane; 2],
}

impl TaskScheduler<'static> for EspScheduler {
    type Error = EspSpawnError;

    fn create_task(
        &mut self,
        descriptor: &TaskDescriptor,
        task: DemoTask<'static>,
    ) -> Result<(), Self::Error> {
        let lane = self
            .lanes
            .iter()
            .find(|lane| lane.priority == descriptor.priority)
            .ok_or(EspSpawnError::NoExecutor(descriptor.priority))?;

        match task {
            DemoTask::Producer(producer) => {
                let token = producer_task(producer).map_err(|_| EspSpawnError::PoolExhausted)?;
                lane.spawner.spawn(token);
            }
            DemoTask::Consumer(consumer) => {
                let token = consumer_task(consumer).map_err(|_| EspSpawnError::PoolExhausted)?;
                lane.spawner.spawn(token);
            }
        }
        Ok(())
    }
}

// ===== 主入口点 =====
#[esp_rtos::main]
async fn main(_spawner: Spawner) {
    // ========================================
    // 1. 硬件与堆初始化
    // ========================================
    let peripherals = esp_hal::init(esp_hal::Config::default());
    esp_alloc::heap_allocator!(size: config::HEAP_SIZE);

    log_info!("{} v{} starting on ESP32-S3", NAME, VERSION);

    // ========================================
    // 2. 启动 esp-rtos (时间驱动 + 主执行器)
    // ========================================
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_ints.software_interrupt0);

    // ========================================
    // 3. 优先级执行器: 消费者高于生产者
    // ========================================
    let high_prio_executor = HIGH_PRIO_EXECUTOR.init(InterruptExecutor::new(sw_ints.software_interrupt2));
    let high_prio_spawner = high_prio_executor.start(Priority::Priority3);

    let mid_prio_executor = MID_PRIO_EXECUTOR.init(InterruptExecutor::new(sw_ints.software_interrupt1));
    let mid_prio_spawner = mid_prio_executor.start(Priority::Priority2);

    let demo = DemoConfig::default();
    let mut scheduler = EspScheduler {
        lanes: [
            PriorityLane {
                priority: demo.consumer_priority,
                spawner: high_prio_spawner,
            },
            PriorityLane {
                priority: demo.producer_priority,
                spawner: mid_prio_spawner,
            },
        ],
    };

    // ========================================
    // 4. 分配队列并创建任务
    // ========================================
    let booted = timed!("boot", {
        boot(&mut scheduler, &demo, |channel| &*CHANNEL.init(channel), &STATS)
    });

    if let Err(error) = booted {
        log_error!("{}", error);
        halt_safely();
    }

    log_info!("All tasks created, scheduler running");

    // ========================================
    // 5. 主循环 - 统计心跳
    // ========================================
    let mut ticker = Ticker::every(Duration::from_secs(config::HEARTBEAT_PERIOD_S));

    loop {
        ticker.next().await;
        log_info!("Heartbeat: {}", STATS.snapshot());
    }
}
