use image::{Rgb, RgbImage};

use crate::error::SourceError;
use crate::source::{Frame, FrameSource};

pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 240;

/// 合成画面视频源
///
/// 生成固定帧数的渐变画面，每帧颜色随序号变化。没有摄像头时可以用来演示和测试。
#[derive(Debug)]
pub struct SyntheticSource {
    total: u64,
    width: u32,
    height: u32,
    next_seq: u64,
    open: bool,
}

impl SyntheticSource {
    pub fn new(total: u64, width: u32, height: u32) -> Self {
        Self {
            total,
            width: width.max(1),
            height: height.max(1),
            next_seq: 1,
            open: true,
        }
    }

    fn render(&self, seq: u64) -> RgbImage {
        let shift = (seq * 8 % 256) as u32;
        let (width, height) = (self.width, self.height);
        RgbImage::from_fn(width, height, |x, y| {
            let r = ((x * 255 / width + shift) % 256) as u8;
            let g = ((y * 255 / height) % 256) as u8;
            let b = (shift % 256) as u8;
            Rgb([r, g, b])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.open {
            return Err(SourceError::Read("视频源已关闭".to_string()));
        }
        if self.next_seq > self.total {
            return Ok(None);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(Frame::new(seq, self.render(seq))))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yields_exact_frame_count_in_order() {
        let mut source = SyntheticSource::new(4, 8, 6);
        let mut seqs = Vec::new();
        while let Some(frame) = source.read_frame().unwrap() {
            assert_eq!((frame.width(), frame.height()), (8, 6));
            seqs.push(frame.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        // 结束后继续读仍然是结束
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut source = SyntheticSource::new(2, 4, 4);
        source.close();
        source.close();
        assert!(!source.is_open());
        assert!(source.read_frame().is_err());
    }
}
