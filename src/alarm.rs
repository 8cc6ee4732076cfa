//! 报警模块
//!
//! 报警音频在启动时加载一次。加载失败不影响检测，只是之后的报警不会发声。
//! 检测循环通过 `trigger_detached` 触发报警，播放在独立线程上进行，
//! 同时播放的数量由所有流共用的信号量限制。

pub mod clip;
pub mod playback;
#[cfg(feature = "pulse")]
pub mod pulse;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tokio::sync::Semaphore;

use crate::error::AlarmError;

pub use clip::AlarmClip;
pub use playback::{LogPlayback, Playback};
#[cfg(feature = "pulse")]
pub use pulse::PulsePlayback;

/// 默认的播放后端：启用 `pulse` 特性时用PulseAudio，否则只记录日志
pub fn default_playback() -> Arc<dyn Playback> {
    #[cfg(feature = "pulse")]
    {
        Arc::new(PulsePlayback::default())
    }
    #[cfg(not(feature = "pulse"))]
    {
        Arc::new(LogPlayback)
    }
}

/// 报警播放器，克隆后共享同一份音频和并发限制
#[derive(Clone)]
pub struct AlarmPlayer {
    clip: Option<Arc<AlarmClip>>,
    backend: Arc<dyn Playback>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    played: Arc<AtomicU64>,
}

impl std::fmt::Debug for AlarmPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmPlayer")
            .field("available", &self.is_available())
            .field("max_concurrent", &self.max_concurrent)
            .field("active", &self.active())
            .field("played", &self.played())
            .finish()
    }
}

impl AlarmPlayer {
    /// 创建播放器
    ///
    /// # 参数
    /// * `clip` - 报警音频，`None` 表示报警不可用
    /// * `backend` - 播放后端
    /// * `max_concurrent` - 最多同时播放几个报警（至少为1）
    pub fn new(clip: Option<AlarmClip>, backend: Arc<dyn Playback>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            clip: clip.map(Arc::new),
            backend,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            played: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 从WAV文件创建播放器
    ///
    /// 加载失败只记录警告，返回一个不会发声的播放器。
    pub fn load(path: impl AsRef<Path>, backend: Arc<dyn Playback>, max_concurrent: usize) -> Self {
        let path = path.as_ref();
        let clip = match AlarmClip::load(path) {
            Ok(clip) => {
                log::info!(
                    "已加载报警音频 {} ({:.1}s)",
                    path.display(),
                    clip.duration().as_secs_f32()
                );
                Some(clip)
            }
            Err(e) => {
                log::warn!("{}: {}，检测将在没有报警声的情况下继续", path.display(), e);
                None
            }
        };
        Self::new(clip, backend, max_concurrent)
    }

    /// 不会发声的播放器
    pub fn unavailable() -> Self {
        Self::new(None, Arc::new(LogPlayback), 1)
    }

    pub fn is_available(&self) -> bool {
        self.clip.is_some()
    }

    /// 正在播放的报警数
    pub fn active(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    /// 已经完整播放过的报警数
    pub fn played(&self) -> u64 {
        self.played.load(Ordering::Acquire)
    }

    /// 播放一次报警，阻塞到播放结束
    ///
    /// 每次调用都是独立的播放，可以从多个线程同时调用。报警不可用时直接返回。
    pub fn trigger(&self) -> Result<(), AlarmError> {
        let Some(clip) = self.clip.as_deref() else {
            log::debug!("报警音频不可用，跳过报警");
            return Ok(());
        };
        self.backend.play(clip)?;
        self.played.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// 在独立线程上播放报警，不阻塞调用方
    ///
    /// 同时播放数已达上限或报警不可用时不播放。
    ///
    /// # 返回值
    /// 是否启动了一次播放
    pub fn trigger_detached(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                log::debug!("已有 {} 个报警在播放，丢弃本次报警", self.max_concurrent);
                return false;
            }
        };

        let player = self.clone();
        let spawned = thread::Builder::new().name("alarm".to_string()).spawn(move || {
            if let Err(e) = player.trigger() {
                log::warn!("{}", e);
            }
            drop(permit);
        });
        match spawned {
            Ok(_) => true,
            Err(e) => {
                log::warn!("无法创建报警线程: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// 按固定时长"播放"并记录调用次数的后端
    struct SlowPlayback {
        delay: Duration,
        calls: Mutex<u32>,
    }

    impl Playback for SlowPlayback {
        fn play(&self, _clip: &AlarmClip) -> Result<(), AlarmError> {
            *self.calls.lock().unwrap() += 1;
            thread::sleep(self.delay);
            Ok(())
        }
    }

    fn slow(delay_ms: u64) -> Arc<SlowPlayback> {
        Arc::new(SlowPlayback {
            delay: Duration::from_millis(delay_ms),
            calls: Mutex::new(0),
        })
    }

    fn clip() -> Option<AlarmClip> {
        Some(AlarmClip::new(vec![0; 16], 1, 8000))
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_unavailable_player_is_silent() {
        let player = AlarmPlayer::unavailable();
        assert!(!player.is_available());
        assert!(player.trigger().is_ok());
        assert!(!player.trigger_detached());
        assert_eq!(player.played(), 0);
    }

    #[cfg(not(feature = "pulse"))]
    #[test]
    fn test_default_playback_without_pulse_still_blocks() {
        let clip = AlarmClip::new(vec![0; 8], 1, 8000);
        assert!(default_playback().play(&clip).is_ok());
    }

    #[test]
    fn test_missing_asset_gives_unavailable_player() {
        let player = AlarmPlayer::load("/definitely/not/here/alarm.wav", Arc::new(LogPlayback), 2);
        assert!(!player.is_available());
    }

    #[test]
    fn test_concurrent_triggers_complete() {
        let backend = slow(50);
        let player = AlarmPlayer::new(clip(), backend.clone(), 4);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let player = player.clone();
                thread::spawn(move || player.trigger())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }

        assert_eq!(*backend.calls.lock().unwrap(), 2);
        assert_eq!(player.played(), 2);
    }

    #[test]
    fn test_detached_trigger_does_not_block() {
        let player = AlarmPlayer::new(clip(), slow(200), 2);
        let start = Instant::now();
        assert!(player.trigger_detached());
        assert!(start.elapsed() < Duration::from_millis(100));

        wait_until(|| player.played() == 1);
        assert_eq!(player.played(), 1);
        wait_until(|| player.active() == 0);
        assert_eq!(player.active(), 0);
    }

    #[test]
    fn test_detached_triggers_are_bounded() {
        let backend = slow(200);
        let player = AlarmPlayer::new(clip(), backend.clone(), 1);

        assert!(player.trigger_detached());
        assert!(!player.trigger_detached());

        wait_until(|| player.active() == 0);
        assert!(player.trigger_detached());
        wait_until(|| player.played() == 2);
        assert_eq!(*backend.calls.lock().unwrap(), 2);
    }
}
