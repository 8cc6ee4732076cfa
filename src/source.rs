//! 视频源模块
//!
//! 把摄像头、图片文件/目录和合成画面统一成 `FrameSource`：逐帧读取，读完返回
//! `Ok(None)`，`close` 可重复调用。
//!
//! # 来源标识
//!
//! - `"0"`、`"1"` ... 摄像头设备编号（需要 `v4l2` 特性）
//! - `"synthetic:N"` 生成N帧渐变画面
//! - 其他字符串视为文件或目录路径，可带 `file://` 前缀

pub mod still;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbImage;

use crate::error::SourceError;

pub use still::StillSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;

/// 一帧原始画面
#[derive(Debug, Clone)]
pub struct Frame {
    /// 从1开始的帧序号，每次打开视频源重新计数
    pub seq: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self { seq, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 视频源标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    /// 摄像头设备编号
    Device(u32),
    /// 图片文件或图片目录
    Path(PathBuf),
    /// 合成画面
    Synthetic { frames: u64, width: u32, height: u32 },
}

impl SourceId {
    pub fn synthetic(frames: u64) -> Self {
        SourceId::Synthetic {
            frames,
            width: synthetic::DEFAULT_WIDTH,
            height: synthetic::DEFAULT_HEIGHT,
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(index) => write!(f, "device:{}", index),
            SourceId::Path(path) => write!(f, "{}", path.display()),
            SourceId::Synthetic { frames, .. } => write!(f, "synthetic:{}", frames),
        }
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("视频源不能为空".to_string());
        }
        if let Ok(index) = s.parse::<u32>() {
            return Ok(SourceId::Device(index));
        }
        if let Some(count) = s.strip_prefix("synthetic:") {
            let frames = count
                .parse::<u64>()
                .map_err(|e| format!("无效的合成帧数 {:?}: {}", count, e))?;
            return Ok(SourceId::synthetic(frames));
        }
        let path = s.strip_prefix("file://").unwrap_or(s);
        Ok(SourceId::Path(PathBuf::from(path)))
    }
}

/// 视频源
///
/// 每个实例只属于一个检测循环。`read_frame` 可能阻塞等待设备或文件I/O。
pub trait FrameSource: Send {
    /// 读取下一帧，视频结束时返回 `Ok(None)`
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// 释放底层资源，可重复调用
    fn close(&mut self);

    /// 底层资源是否仍然打开
    fn is_open(&self) -> bool;
}

/// 打开视频源的函数，控制器通过它创建视频源，测试可以替换成自己的实现
pub type SourceOpener =
    Arc<dyn Fn(&SourceId) -> Result<Box<dyn FrameSource>, SourceError> + Send + Sync>;

/// 按标识打开视频源
pub fn open_source(id: &SourceId) -> Result<Box<dyn FrameSource>, SourceError> {
    match id {
        SourceId::Device(index) => open_device(*index),
        SourceId::Path(path) => Ok(Box::new(StillSource::open(path)?)),
        SourceId::Synthetic { frames, width, height } => {
            Ok(Box::new(SyntheticSource::new(*frames, *width, *height)))
        }
    }
}

/// 默认的打开函数
pub fn default_opener() -> SourceOpener {
    Arc::new(open_source)
}

#[cfg(feature = "v4l2")]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>, SourceError> {
    Ok(Box::new(V4l2Source::open(index)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>, SourceError> {
    Err(SourceError::unavailable(
        SourceId::Device(index),
        "编译时未启用 v4l2 特性，无法打开摄像头",
    ))
}
