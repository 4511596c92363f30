//! 日志宏
//!
//! 队列演示只用到五个级别的日志宏和一个计时宏。级别宏本身与后端无关,
//! 统一转发给 `__log_emit!`, 后端由 feature 决定:
//!
//! | feature | 后端 |
//! |---|---|
//! | `log-defmt` | defmt (经 RTT 输出) |
//! | `dev` / `log-println` | esp-println, 行首带 `[LEVEL]` |
//! | 无 | 不输出, 参数仍做类型检查 (主机测试走这里) |

// ===== 后端分派 =====

#[doc(hidden)]
#[cfg(feature = "log-defmt")]
#[macro_export]
macro_rules! __log_emit {
    ($level:ident, $tag:literal, $($arg:tt)*) => { defmt::$level!($($arg)*) };
}

#[doc(hidden)]
#[cfg(all(any(feature = "dev", feature = "log-println"), not(feature = "log-defmt")))]
#[macro_export]
macro_rules! __log_emit {
    ($level:ident, $tag:literal, $($arg:tt)*) => {
        esp_println::println!("[{}] {}", $tag, format_args!($($arg)*))
    };
}

#[doc(hidden)]
#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! __log_emit {
    ($level:ident, $tag:literal, $($arg:tt)*) => {{
        if false {
            let _ = format_args!($($arg)*);
        }
    }};
}

// ===== 级别 =====

/// 队列满、启动失败
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::__log_emit!(error, "ERROR", $($arg)*) };
}

/// 消费者发现队列非空
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::__log_emit!(warn, "WARN", $($arg)*) };
}

/// 收到消息、超时、任务启动
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::__log_emit!(info, "INFO", $($arg)*) };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::__log_emit!(debug, "DEBUG", $($arg)*) };
}

/// 每次发送
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => { $crate::__log_emit!(trace, "TRACE", $($arg)*) };
}

// ===== 计时 =====

/// 执行 `$block` 并以 debug 级别记录耗时; 没有日志后端时只执行代码块
///
/// ```ignore
/// let booted = timed!("boot", boot(&mut scheduler, &demo, place, &STATS));
/// ```
#[cfg(any(feature = "dev", feature = "log-defmt", feature = "log-println"))]
#[macro_export]
macro_rules! timed {
    ($name:expr, $block:expr) => {{
        let started = embassy_time::Instant::now();
        let value = $block;
        $crate::log_debug!("{} took {}us", $name, started.elapsed().as_micros());
        value
    }};
}

#[cfg(not(any(feature = "dev", feature = "log-defmt", feature = "log-println")))]
#[macro_export]
macro_rules! timed {
    ($name:expr, $block:expr) => {
        $block
    };
}

pub use crate::{log_debug, log_error, log_info, log_trace, log_warn, timed};
