//! MS-SSIM 心跳检测模块
//!
//! 🔥 v7.6: 定期输出活动状态，防止用户误以为程序卡死
//!
//! ## 功能
//! - 每30秒输出一次心跳信息
//! - 显示北京时间（UTC+8）
//! - 线程安全的启动和停止
//! - RAII模式自动清理

#[cfg(test)]
use chrono::Timelike;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 心跳检测器
///
/// 在后台线程中定期输出活动状态，让用户知道程序还在运行
pub struct Heartbeat {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Heartbeat {
    /// 启动心跳检测（每N秒输出一次）
    ///
    /// # Arguments
    /// * `interval_secs` - 心跳间隔（秒）
    ///
    /// # Returns
    /// Heartbeat实例，Drop时自动停止
    ///
    /// # Examples
    /// ```no_run
    /// use shared_utils::msssim_heartbeat::Heartbeat;
    ///
    /// let heartbeat = Heartbeat::start(30);
    /// // 做一些耗时操作...
    /// heartbeat.stop(); // 或者让它自动Drop
    /// ```
    pub fn start(interval_secs: u64) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = thread::spawn(move || {
            while running_clone.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_secs(interval_secs));

                if running_clone.load(Ordering::Relaxed) {
                    let beijing_time = Self::get_beijing_time();
                    eprintln!("💓 Heartbeat: Active (Beijing Time: {})", beijing_time);
                }
            }
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// 停止心跳检测
    ///
    /// 显式停止心跳线程。如果不调用此方法，Drop时也会自动停止。
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// 获取北京时间（UTC+8）
    ///
    /// # Returns
    /// 格式化的北京时间字符串："YYYY-MM-DD HH:MM:SS"
    fn get_beijing_time() -> String {
        let utc_now: DateTime<Utc> = Utc::now();
        let beijing_offset = FixedOffset::east_opt(8 * 3600).expect("Invalid timezone offset");
        let beijing_time = utc_now.with_timezone(&beijing_offset);
        beijing_time.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// 获取当前北京时间（公开方法，用于测试）
    ///
    /// # Returns
    /// 格式化的北京时间字符串
    pub fn beijing_time_now() -> String {
        Self::get_beijing_time()
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
