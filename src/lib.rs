pub mod alarm;
pub mod config;
pub mod error;
pub mod registry;
pub mod source;
pub mod stream;
pub mod utils;
pub mod vision;

// 重新导出常用类型和函数
pub use alarm::{AlarmClip, AlarmPlayer, default_playback};
pub use config::{ChannelOrder, DetectorConfig, StreamConfig};
pub use error::{AlarmError, ClassifierError, SourceError, StreamError};
pub use registry::StreamRegistry;
pub use source::{Frame, FrameSource, SourceId, open_source};
pub use stream::{RenderedFrame, StopReason, StreamController, StreamEvent, StreamId, StreamState, StreamStats};
pub use vision::{Classifier, OnnxClassifier, Prediction, SharedClassifier, shared};
