//! 错误类型
//!
//! 每一类关注点一个错误枚举。视频读到结尾不是错误，由 `Ok(None)` 表示。

use thiserror::Error;

/// 视频源错误
#[derive(Debug, Error)]
pub enum SourceError {
    /// 摄像头或文件无法打开，该路流不会启动
    #[error("视频源不可用: {source_id}: {reason}")]
    Unavailable { source_id: String, reason: String },

    #[error("读取帧失败: {0}")]
    Read(String),

    #[error("帧解码失败: {0}")]
    Decode(#[from] image::ImageError),
}

impl SourceError {
    pub fn unavailable(source_id: impl ToString, reason: impl ToString) -> Self {
        Self::Unavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::Read(e.to_string())
    }
}

/// 分类器错误
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// 模型文件缺失或格式错误，程序无法继续
    #[error("模型加载失败: {path}: {source}")]
    ModelLoad {
        path: String,
        #[source]
        source: ort::Error,
    },

    #[error("推理失败: {0}")]
    Inference(#[from] ort::Error),

    #[error("模型输出形状不符合预期: {0}")]
    Shape(String),
}

/// 报警音频错误，都不是致命错误
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("报警音频加载失败: {0}")]
    AssetLoad(#[from] hound::Error),

    #[error("不支持的音频格式: {0}")]
    UnsupportedFormat(String),

    #[error("音频播放失败: {0}")]
    Playback(String),
}

/// 单路流的错误，只影响该路流
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error("检测线程异常退出: {0}")]
    Panicked(String),

    #[error("无法创建检测线程: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("未知的流: {0}")]
    UnknownStream(usize),
}
