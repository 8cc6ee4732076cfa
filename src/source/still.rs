use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::error::SourceError;
use crate::source::{Frame, FrameSource};

/// 图片文件视频源
///
/// 路径是单张图片时只产生一帧；路径是目录时，按文件名顺序逐张读取其中的图片，
/// 相当于一段逐帧导出的视频。图片在读取时才解码。
#[derive(Debug)]
pub struct StillSource {
    pending: VecDeque<PathBuf>,
    next_seq: u64,
    open: bool,
}

impl StillSource {
    /// 打开图片文件或图片目录
    ///
    /// # 错误处理
    /// 路径不存在、目录无法读取或目录里没有图片时返回 `SourceError::Unavailable`
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let unavailable = |reason: String| SourceError::unavailable(path.display(), reason);

        let metadata = fs::metadata(path).map_err(|e| unavailable(e.to_string()))?;
        let pending: VecDeque<PathBuf> = if metadata.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)
                .map_err(|e| unavailable(e.to_string()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_image(p))
                .collect();
            files.sort();
            files.into()
        } else if is_image(path) {
            VecDeque::from([path.to_path_buf()])
        } else {
            return Err(unavailable("不是可识别的图片格式".to_string()));
        };

        if pending.is_empty() {
            return Err(unavailable("目录中没有图片".to_string()));
        }

        Ok(Self {
            pending,
            next_seq: 1,
            open: true,
        })
    }

    /// 剩余未读取的帧数
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for StillSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.open {
            return Err(SourceError::Read("视频源已关闭".to_string()));
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)?.to_rgb8();
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(Frame::new(seq, image)))
    }

    fn close(&mut self) {
        self.pending.clear();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

fn is_image(path: &Path) -> bool {
    ImageFormat::from_path(path).is_ok()
}
