use image::ImageFormat;
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use crate::error::SourceError;
use crate::source::{Frame, FrameSource, SourceId};

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

/// V4L2 摄像头视频源
///
/// 打开 `/dev/video{index}`，以MJPEG格式采集，每帧解码成RGB图像。
/// `close` 之后设备和映射的缓冲区全部释放。
pub struct V4l2Source {
    index: u32,
    stream: Option<MmapStream<'static>>,
    next_seq: u64,
}

impl std::fmt::Debug for V4l2Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Source")
            .field("index", &self.index)
            .field("stream", &self.stream.is_some())
            .field("next_seq", &self.next_seq)
            .finish()
    }
}

impl V4l2Source {
    /// 打开摄像头
    ///
    /// # 错误处理
    /// 设备不存在、不支持MJPEG或无法建立采集流时返回 `SourceError::Unavailable`
    pub fn open(index: u32) -> Result<Self, SourceError> {
        let unavailable = |reason: String| SourceError::unavailable(SourceId::Device(index), reason);

        let device = Device::new(index as usize).map_err(|e| unavailable(e.to_string()))?;

        let mut format = Format::new(CAPTURE_WIDTH, CAPTURE_HEIGHT, FourCC::new(b"MJPG"));
        format = Capture::set_format(&device, &format).map_err(|e| unavailable(e.to_string()))?;
        if format.fourcc != FourCC::new(b"MJPG") {
            return Err(unavailable("设备不支持MJPEG格式".to_string()));
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| unavailable(e.to_string()))?;

        log::info!(
            "已打开摄像头 /dev/video{} ({}x{})",
            index,
            format.width,
            format.height
        );

        Ok(Self {
            index,
            stream: Some(stream),
            next_seq: 1,
        })
    }
}

impl FrameSource for V4l2Source {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SourceError::Read("摄像头已关闭".to_string()))?;

        let (data, _metadata) = CaptureStream::next(stream)?;
        let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();

        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(Frame::new(seq, image)))
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("已释放摄像头 /dev/video{}", self.index);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}
