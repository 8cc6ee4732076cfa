use libpulse_binding::sample::{Format, Spec};
use libpulse_binding::stream::Direction;
use libpulse_simple_binding::Simple;

use crate::alarm::{AlarmClip, Playback};
use crate::error::AlarmError;

/// PulseAudio播放后端
///
/// 每次播放单独建立一条PulseAudio连接，多路报警可以同时发声，互不干扰。
#[derive(Debug, Clone, Default)]
pub struct PulsePlayback {
    device: Option<String>,
}

impl PulsePlayback {
    /// `device` 为 `None` 时使用默认输出设备
    pub fn new(device: Option<&str>) -> Self {
        Self {
            device: device.map(|s| s.to_string()),
        }
    }
}

impl Playback for PulsePlayback {
    fn play(&self, clip: &AlarmClip) -> Result<(), AlarmError> {
        let spec = Spec {
            format: Format::S16NE,
            channels: clip.channels() as u8,
            rate: clip.sample_rate(),
        };
        if !spec.is_valid() {
            return Err(AlarmError::Playback("无效的音频参数".to_string()));
        }

        let simple = Simple::new(
            None,
            "vigil",
            Direction::Playback,
            self.device.as_deref(),
            "alarm",
            &spec,
            None,
            None,
        )
        .map_err(|e| AlarmError::Playback(ToString::to_string(&e)))?;

        let bytes: Vec<u8> = clip.samples().iter().flat_map(|s| s.to_ne_bytes()).collect();
        simple
            .write(&bytes)
            .map_err(|e| AlarmError::Playback(ToString::to_string(&e)))?;
        // 等到缓冲区里的数据全部播完
        simple
            .drain()
            .map_err(|e| AlarmError::Playback(ToString::to_string(&e)))?;
        Ok(())
    }
}
