//! 有界消息队列
//!
//! 运行时指定容量的 FIFO 队列, 供多个互相抢占的任务共享:
//! - `try_send`: 非阻塞发送, 队列满时立即返回 `Full`
//! - `receive`: 带超时的接收, 队列空时挂起当前任务
//! - `try_receive`: 非阻塞接收
//!
//! 缓冲区与计数由 `CriticalBlockingMutex` 保护, 调用方无需额外加锁。
//!
//! # 唤醒规则
//! 每次成功发送最多唤醒一个等待者, 即等待最久的那个 (FIFO)。
//! 被唤醒的接收者在队列中拥有一个"预留"元素, 新来的接收者不能抢走它;
//! 若被唤醒的接收者在取走元素之前超时放弃, 唤醒会转交给下一个等待者。
//!
//! # Example
//! ```ignore
//! let channel = BoundedChannel::<u32>::create(5)?;
//!
//! // 生产者 (从不阻塞)
//! if let Err(Full(value)) = channel.try_send(100) {
//!     log_error!("queue full, dropped {}", value);
//! }
//!
//! // 消费者 (最多等待 100ms)
//! match channel.receive(Duration::from_millis(100)).await {
//!     ReceiveOutcome::Delivered(value) => log_info!("Received = {}", value),
//!     ReceiveOutcome::TimedOut => log_info!("nothing received"),
//! }
//! ```

use alloc::collections::VecDeque;
use core::cell::RefCell;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use embassy_time::{with_deadline, Duration, Instant};

use super::primitives::CriticalBlockingMutex;

/// 预先为等待队列保留的槽位, 避免在常见拓扑下于 poll 中分配内存
const RESERVED_WAITERS: usize = 2;

// ===== 错误与结果类型 =====

/// 队列创建失败
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocationError {
    /// 容量为零
    ZeroCapacity,
    /// 堆内存不足 (或容量溢出)
    OutOfMemory {
        /// 请求的元素个数
        requested: usize,
    },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroCapacity => write!(f, "Queue capacity must be non-zero"),
            Self::OutOfMemory { requested } => {
                write!(f, "Unable to allocate queue storage for {} items", requested)
            }
        }
    }
}

/// 非阻塞发送失败: 队列已满, 原样退回被拒绝的元素
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Full<T>(pub T);

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Queue full")
    }
}

/// 一次接收尝试的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveOutcome<T> {
    /// 收到一个元素
    Delivered(T),
    /// 超时内没有数据
    TimedOut,
}

// ===== 内部状态 =====

struct Waiter {
    ticket: u32,
    waker: Waker,
}

/// 接收 future 在等待队列中的登记状态
#[derive(Clone, Copy)]
enum Slot {
    Idle,
    Waiting(u32),
}

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    /// 尚未被通知的等待者, 按登记顺序排列
    waiting: VecDeque<Waiter>,
    /// 已被通知但尚未取走元素的接收者数量 (始终 <= items.len())
    notified: usize,
    next_ticket: u32,
}

impl<T> State<T> {
    fn push(&mut self, item: T) -> Result<(), Full<T>> {
        if self.items.len() >= self.capacity {
            return Err(Full(item));
        }
        self.items.push_back(item);
        self.notify_next();
        Ok(())
    }

    /// 若有未预留的元素, 唤醒等待最久的接收者
    fn notify_next(&mut self) {
        if self.items.len() <= self.notified {
            return;
        }
        if let Some(waiter) = self.waiting.pop_front() {
            self.notified += 1;
            waiter.waker.wake();
        }
    }

    /// 未登记的调用者只能取走未被预留的元素
    fn take_unreserved(&mut self) -> Option<T> {
        if self.items.len() > self.notified {
            self.items.pop_front()
        } else {
            None
        }
    }

    fn poll_receive(&mut self, slot: &mut Slot, cx: &mut Context<'_>) -> Poll<T> {
        match *slot {
            Slot::Idle => {
                if let Some(item) = self.take_unreserved() {
                    return Poll::Ready(item);
                }
                let ticket = self.next_ticket;
                self.next_ticket = self.next_ticket.wrapping_add(1);
                self.waiting.push_back(Waiter {
                    ticket,
                    waker: cx.waker().clone(),
                });
                *slot = Slot::Waiting(ticket);
                Poll::Pending
            }
            Slot::Waiting(ticket) => {
                if let Some(waiter) = self.waiting.iter_mut().find(|w| w.ticket == ticket) {
                    // 尚未轮到: 仅刷新 waker
                    if !waiter.waker.will_wake(cx.waker()) {
                        waiter.waker = cx.waker().clone();
                    }
                    return Poll::Pending;
                }

                // 已被通知, 队首有为本接收者预留的元素
                self.notified = self.notified.saturating_sub(1);
                match self.items.pop_front() {
                    Some(item) => {
                        *slot = Slot::Idle;
                        Poll::Ready(item)
                    }
                    None => {
                        self.waiting.push_front(Waiter {
                            ticket,
                            waker: cx.waker().clone(),
                        });
                        Poll::Pending
                    }
                }
            }
        }
    }

    /// 接收 future 被丢弃 (通常是超时)
    fn cancel(&mut self, slot: Slot) {
        let Slot::Waiting(ticket) = slot else {
            return;
        };
        if let Some(pos) = self.waiting.iter().position(|w| w.ticket == ticket) {
            self.waiting.remove(pos);
        } else {
            // 已被通知却放弃了: 把唤醒转交给下一个等待者
            self.notified = self.notified.saturating_sub(1);
            self.notify_next();
        }
    }
}

// ===== BoundedChannel =====

/// 有界 FIFO 队列
///
/// 不变量: `0 <= len() <= capacity()`; 第 i 次成功接收返回第 i 次成功发送的元素。
///
/// 队列通过共享引用在任务间传递 (固件中为 `StaticCell` 中的 `&'static`),
/// 所有修改都经由内部的临界区互斥锁串行化。
pub struct BoundedChannel<T> {
    state: CriticalBlockingMutex<RefCell<State<T>>>,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// 创建容量为 `capacity` 的队列, 存储空间一次性从堆上分配
    ///
    /// 这是整个系统唯一的初始化失败点, 调用方必须在启动任何任务之前检查结果。
    pub fn create(capacity: usize) -> Result<Self, AllocationError> {
        if capacity == 0 {
            return Err(AllocationError::ZeroCapacity);
        }

        let mut items = VecDeque::new();
        items
            .try_reserve_exact(capacity)
            .map_err(|_| AllocationError::OutOfMemory { requested: capacity })?;

        let mut waiting = VecDeque::new();
        waiting
            .try_reserve(RESERVED_WAITERS)
            .map_err(|_| AllocationError::OutOfMemory { requested: capacity })?;

        Ok(Self {
            state: CriticalBlockingMutex::new(RefCell::new(State {
                items,
                capacity,
                waiting,
                notified: 0,
                next_ticket: 0,
            })),
            capacity,
        })
    }

    #[inline]
    fn with_state<R>(&self, f: impl FnOnce(&mut State<T>) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// 队列容量
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 当前元素数量
    ///
    /// 只是一个快照, 返回时可能已被其他任务改变, 仅用于诊断
    pub fn len(&self) -> usize {
        self.with_state(|s| s.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 非阻塞发送
    ///
    /// 队列满时立即返回 `Full` 并退回元素, 不修改任何状态, 从不挂起调用者。
    /// 成功时唤醒等待最久的接收者 (如果有)。
    pub fn try_send(&self, item: T) -> Result<(), Full<T>> {
        self.with_state(|s| s.push(item))
    }

    /// 非阻塞接收 (零等待)
    pub fn try_receive(&self) -> Option<T> {
        self.with_state(|s| s.take_unreserved())
    }

    /// 无限期等待下一个元素
    pub fn receive_forever(&self) -> ReceiveFuture<'_, T> {
        ReceiveFuture {
            channel: self,
            slot: Slot::Idle,
        }
    }

    /// 带超时的接收
    ///
    /// 队列非空时立即返回队首元素; 否则挂起当前任务, 直到有数据到达或
    /// `timeout` 到期 (返回 `TimedOut`, 队列状态不变)。
    /// `Duration::from_ticks(0)` 等价于 `try_receive`; 截止时间超出时钟范围
    /// (例如 `Duration::MAX`) 表示永久等待。
    pub async fn receive(&self, timeout: Duration) -> ReceiveOutcome<T> {
        if let Some(item) = self.try_receive() {
            return ReceiveOutcome::Delivered(item);
        }
        if timeout.as_ticks() == 0 {
            return ReceiveOutcome::TimedOut;
        }

        // 截止时间超出时钟范围即视为永久等待
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return ReceiveOutcome::Delivered(self.receive_forever().await);
        };

        match with_deadline(deadline, self.receive_forever()).await {
            Ok(item) => ReceiveOutcome::Delivered(item),
            Err(_) => ReceiveOutcome::TimedOut,
        }
    }
}

/// `BoundedChannel::receive_forever` 返回的 future
///
/// 被丢弃时会撤销登记; 若已被通知, 唤醒转交给下一个等待者。
pub struct ReceiveFuture<'a, T> {
    channel: &'a BoundedChannel<T>,
    slot: Slot,
}

impl<T> Future for ReceiveFuture<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let slot = &mut this.slot;
        this.channel.with_state(|s| s.poll_receive(slot, cx))
    }
}

impl<T> Drop for ReceiveFuture<'_, T> {
    fn drop(&mut self) {
        let slot = self.slot;
        if let Slot::Waiting(_) = slot {
            self.channel.with_state(|s| s.cancel(slot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl CountingWaker {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn wake_by_ref(self: &Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_waker() -> (Arc<CountingWaker>, Waker) {
        let inner = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(inner.clone());
        (inner, waker)
    }

    #[test]
    fn test_create_rejects_zero_capacity() {
        assert_eq!(
            BoundedChannel::<u32>::create(0).err(),
            Some(AllocationError::ZeroCapacity)
        );
    }

    #[test]
    fn test_create_reports_allocation_failure() {
        let result = BoundedChannel::<u32>::create(usize::MAX);
        assert_eq!(
            result.err(),
            Some(AllocationError::OutOfMemory { requested: usize::MAX })
        );
    }

    #[test]
    fn test_full_rejection_leaves_count_unchanged() {
        let channel = BoundedChannel::<u32>::create(2).unwrap();

        assert!(channel.try_send(1).is_ok());
        assert!(channel.try_send(2).is_ok());
        assert_eq!(channel.len(), channel.capacity());

        assert_eq!(channel.try_send(3), Err(Full(3)));
        assert_eq!(channel.len(), 2);
        assert_eq!(channel.try_receive(), Some(1));
    }

    #[test]
    fn test_fifo_order() {
        let channel = BoundedChannel::<u32>::create(5).unwrap();
        for value in [10, 20, 30, 40, 50] {
            channel.try_send(value).unwrap();
        }
        let drained: Vec<u32> = core::iter::from_fn(|| channel.try_receive()).collect();
        assert_eq!(drained, vec![10, 20, 30, 40, 50]);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_count_stays_within_bounds() {
        let channel = BoundedChannel::<u32>::create(3).unwrap();
        let mut expected = 0usize;

        // 交替发送与接收, 计数始终在 [0, capacity] 之内
        for round in 0..20u32 {
            if round % 3 == 2 {
                if channel.try_receive().is_some() {
                    expected -= 1;
                }
            } else if channel.try_send(round).is_ok() {
                expected += 1;
            }
            assert_eq!(channel.len(), expected);
            assert!(channel.len() <= channel.capacity());
        }

        while channel.try_receive().is_some() {}
        assert_eq!(channel.try_receive(), None);
        assert_eq!(channel.len(), 0);
    }

    #[test]
    fn test_receive_returns_immediately_when_data_available() {
        let channel = BoundedChannel::<u32>::create(5).unwrap();
        channel.try_send(100).unwrap();

        let outcome = block_on(channel.receive(Duration::from_millis(100)));
        assert_eq!(outcome, ReceiveOutcome::Delivered(100));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_receive_times_out_on_empty_channel() {
        let channel = BoundedChannel::<u32>::create(5).unwrap();
        let timeout = Duration::from_millis(50);

        let start = Instant::now();
        let outcome = block_on(channel.receive(timeout));
        let elapsed = start.elapsed();

        assert_eq!(outcome, ReceiveOutcome::TimedOut);
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(5));
        assert_eq!(channel.len(), 0);
    }

    #[test]
    fn test_zero_timeout_is_a_poll() {
        let channel = BoundedChannel::<u32>::create(1).unwrap();
        assert_eq!(
            block_on(channel.receive(Duration::from_ticks(0))),
            ReceiveOutcome::TimedOut
        );
        channel.try_send(5).unwrap();
        assert_eq!(
            block_on(channel.receive(Duration::from_ticks(0))),
            ReceiveOutcome::Delivered(5)
        );
    }

    #[test]
    fn test_huge_timeout_returns_queued_item() {
        let channel = BoundedChannel::<u32>::create(2).unwrap();
        channel.try_send(1).unwrap();
        channel.try_send(2).unwrap();

        assert_eq!(
            block_on(channel.receive(Duration::from_ticks(u64::MAX - 1))),
            ReceiveOutcome::Delivered(1)
        );
        assert_eq!(
            block_on(channel.receive(Duration::MAX)),
            ReceiveOutcome::Delivered(2)
        );
        assert!(channel.is_empty());
    }

    #[test]
    fn test_huge_timeout_waits_for_sender() {
        let channel = Arc::new(BoundedChannel::<u32>::create(1).unwrap());
        let sender = {
            let channel = channel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(20));
                channel.try_send(9).unwrap();
            })
        };

        let outcome = block_on(channel.receive(Duration::from_ticks(u64::MAX - 1)));
        sender.join().unwrap();
        assert_eq!(outcome, ReceiveOutcome::Delivered(9));
    }

    #[test]
    fn test_waiters_are_woken_in_fifo_order() {
        let channel = BoundedChannel::<u32>::create(4).unwrap();
        let (count_a, waker_a) = counting_waker();
        let (count_b, waker_b) = counting_waker();
        let mut cx_a = Context::from_waker(&waker_a);
        let mut cx_b = Context::from_waker(&waker_b);

        let mut first = channel.receive_forever();
        let mut second = channel.receive_forever();
        assert!(Pin::new(&mut first).poll(&mut cx_a).is_pending());
        assert!(Pin::new(&mut second).poll(&mut cx_b).is_pending());

        channel.try_send(7).unwrap();
        assert_eq!(count_a.count(), 1);
        assert_eq!(count_b.count(), 0);

        // 预留给第一个等待者的元素不能被新来的接收者取走
        assert_eq!(channel.try_receive(), None);
        assert_eq!(Pin::new(&mut first).poll(&mut cx_a), Poll::Ready(7));

        channel.try_send(8).unwrap();
        assert_eq!(count_a.count(), 1);
        assert_eq!(count_b.count(), 1);
        assert_eq!(Pin::new(&mut second).poll(&mut cx_b), Poll::Ready(8));
        assert!(channel.is_empty());
    }

    #[test]
    fn test_abandoned_wakeup_passes_to_next_waiter() {
        let channel = BoundedChannel::<u32>::create(4).unwrap();
        let (count_a, waker_a) = counting_waker();
        let (count_b, waker_b) = counting_waker();
        let mut cx_a = Context::from_waker(&waker_a);
        let mut cx_b = Context::from_waker(&waker_b);

        let mut second = channel.receive_forever();
        {
            let mut first = channel.receive_forever();
            assert!(Pin::new(&mut first).poll(&mut cx_a).is_pending());
            assert!(Pin::new(&mut second).poll(&mut cx_b).is_pending());

            channel.try_send(42).unwrap();
            assert_eq!(count_a.count(), 1);
            // first 在取走元素前被丢弃 (例如超时)
        }

        assert_eq!(count_b.count(), 1);
        assert_eq!(Pin::new(&mut second).poll(&mut cx_b), Poll::Ready(42));
    }

    #[test]
    fn test_cancelled_waiter_is_not_woken() {
        let channel = BoundedChannel::<u32>::create(2).unwrap();
        let (count_a, waker_a) = counting_waker();
        let mut cx_a = Context::from_waker(&waker_a);

        {
            let mut waiting = channel.receive_forever();
            assert!(Pin::new(&mut waiting).poll(&mut cx_a).is_pending());
        }

        channel.try_send(1).unwrap();
        assert_eq!(count_a.count(), 0);
        assert_eq!(channel.try_receive(), Some(1));
    }

    #[test]
    fn test_concurrent_senders_keep_per_source_order() {
        const PER_SENDER: u32 = 500;
        let channel = Arc::new(BoundedChannel::<(u32, u32)>::create(5).unwrap());

        let senders: Vec<_> = [100u32, 200u32]
            .into_iter()
            .map(|source| {
                let channel = channel.clone();
                std::thread::spawn(move || {
                    for seq in 0..PER_SENDER {
                        let mut item = (source, seq);
                        while let Err(Full(rejected)) = channel.try_send(item) {
                            item = rejected;
                            std::thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let mut next_seq = [0u32; 2];
        let mut received = 0;
        while received < 2 * PER_SENDER {
            assert!(channel.len() <= channel.capacity());
            match channel.try_receive() {
                Some((source, seq)) => {
                    let idx = if source == 100 { 0 } else { 1 };
                    assert_eq!(seq, next_seq[idx]);
                    next_seq[idx] += 1;
                    received += 1;
                }
                None => std::thread::yield_now(),
            }
        }

        for sender in senders {
            sender.join().unwrap();
        }
        assert_eq!(next_seq, [PER_SENDER, PER_SENDER]);
        assert!(channel.is_empty());
    }
}
