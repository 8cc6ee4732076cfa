use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader};

use crate::error::AlarmError;

/// 解码后的报警音频，交错排列的16位PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmClip {
    samples: Vec<i16>,
    channels: u16,
    sample_rate: u32,
}

impl AlarmClip {
    pub fn new(samples: Vec<i16>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
        }
    }

    /// 从WAV文件加载报警音频
    ///
    /// 支持整数PCM（8到32位，统一转换为16位）和32位浮点PCM，声道数不限。
    ///
    /// # 错误处理
    /// 文件不存在或无法解析时返回 `AlarmError::AssetLoad`，
    /// 其他采样格式返回 `AlarmError::UnsupportedFormat`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AlarmError> {
        let reader = WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader.into_samples::<i16>().collect::<Result<_, _>>()?,
            (SampleFormat::Int, bits @ 8..=32) => reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| rescale_int(v, bits)))
                .collect::<Result<_, _>>()?,
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()?,
            (format, bits) => {
                return Err(AlarmError::UnsupportedFormat(format!(
                    "{:?} {} bit",
                    format, bits
                )));
            }
        };

        Ok(Self::new(samples, spec.channels, spec.sample_rate))
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// 播放时长
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() as u64 / self.channels as u64;
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }
}

fn rescale_int(value: i32, bits: u16) -> i16 {
    if bits >= 16 {
        (value >> (bits - 16)) as i16
    } else {
        (value << (16 - bits)) as i16
    }
}
