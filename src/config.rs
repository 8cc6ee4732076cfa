use std::time::Duration;

use crate::source::SourceId;

pub const WINDOW_LEN: usize = 16;  // 模型一次读取的帧数
pub const DEFAULT_ALERT_LABEL: &str = "Violence";
pub const DEFAULT_LABELS: [&str; 2] = ["NonViolence", "Violence"];

// 模型输入尺寸
pub const DEFAULT_INPUT_WIDTH: usize = 64;
pub const DEFAULT_INPUT_HEIGHT: usize = 64;

// 循环与报警参数
pub const DEFAULT_PACING_MS: u64 = 30;
pub const DEFAULT_ALARM_COOLDOWN_MS: u64 = 3000;
pub const DEFAULT_MAX_CONCURRENT_ALARMS: usize = 4;

pub const DEFAULT_MODEL_PATH: &str = "model.onnx";
pub const DEFAULT_ALARM_PATH: &str = "alarm.wav";

/// 预处理时写入张量的通道顺序
///
/// 参考模型是用蓝-绿-红顺序的帧训练的，所以默认是 `Bgr`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    Rgb,
    #[default]
    Bgr,
}

/// 检测流程的参数配置
///
/// 窗口长度和输入分辨率由模型的输入形状决定，换模型时在这里调整。
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    window_len: usize,
    input_width: usize,
    input_height: usize,
    channel_order: ChannelOrder,
    labels: Vec<String>,
    alert_label: String,
    pacing: Duration,
    alarm_cooldown: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_len: WINDOW_LEN,
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
            channel_order: ChannelOrder::default(),
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
            alert_label: DEFAULT_ALERT_LABEL.to_string(),
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
            alarm_cooldown: Duration::from_millis(DEFAULT_ALARM_COOLDOWN_MS),
        }
    }
}

impl DetectorConfig {
    /// 设置滑动窗口长度（至少为1）
    pub fn with_window_len(mut self, window_len: usize) -> Self {
        self.window_len = window_len.max(1);
        self
    }

    /// 设置模型输入分辨率
    pub fn with_input_size(mut self, width: usize, height: usize) -> Self {
        self.input_width = width.max(1);
        self.input_height = height.max(1);
        self
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    /// 设置类别列表，顺序必须与模型训练时的标签顺序一致
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_alert_label(mut self, label: impl Into<String>) -> Self {
        self.alert_label = label.into();
        self
    }

    /// 设置两次迭代之间的间隔
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// 设置同一路流两次报警之间的最短间隔
    pub fn with_alarm_cooldown(mut self, cooldown: Duration) -> Self {
        self.alarm_cooldown = cooldown;
        self
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn input_height(&self) -> usize {
        self.input_height
    }

    pub fn channel_order(&self) -> ChannelOrder {
        self.channel_order
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn alert_label(&self) -> &str {
        &self.alert_label
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn alarm_cooldown(&self) -> Duration {
        self.alarm_cooldown
    }
}

/// 单路流的配置
#[derive(Debug, Clone)]
pub struct StreamConfig {
    source: SourceId,
    title: Option<String>,
    detector: DetectorConfig,
}

impl StreamConfig {
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            title: None,
            detector: DetectorConfig::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
        self.detector = detector;
        self
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn detector(&self) -> &DetectorConfig {
        &self.detector
    }
}

/// 按位置生成默认标题：第一路是内置摄像头，其余是USB摄像头
pub fn default_title(position: usize) -> String {
    if position == 0 {
        format!("Stream {} (Webcam)", position + 1)
    } else {
        format!("Stream {} (USB Camera)", position + 1)
    }
}
