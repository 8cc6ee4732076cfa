use std::thread;

use crate::alarm::AlarmClip;
use crate::error::AlarmError;

/// 音频播放后端
///
/// `play` 阻塞到播放结束。每次调用都是独立的一次播放，允许多个线程同时调用。
pub trait Playback: Send + Sync {
    fn play(&self, clip: &AlarmClip) -> Result<(), AlarmError>;
}

/// 只记录日志的播放后端
///
/// 没有声音服务时使用：记录一条警告，然后按音频时长等待，保持阻塞语义。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPlayback;

impl Playback for LogPlayback {
    fn play(&self, clip: &AlarmClip) -> Result<(), AlarmError> {
        log::warn!("报警! ({:.1}s)", clip.duration().as_secs_f32());
        thread::sleep(clip.duration());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_log_playback_blocks_for_clip_duration() {
        let clip = AlarmClip::new(vec![0; 400], 1, 8000);
        let start = Instant::now();
        LogPlayback.play(&clip).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
