use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};

use vigil::config::{
    DEFAULT_ALARM_COOLDOWN_MS, DEFAULT_ALARM_PATH, DEFAULT_ALERT_LABEL, DEFAULT_INPUT_WIDTH,
    DEFAULT_MAX_CONCURRENT_ALARMS, DEFAULT_MODEL_PATH, DEFAULT_PACING_MS, WINDOW_LEN,
};
use vigil::{
    AlarmPlayer, ChannelOrder, DetectorConfig, OnnxClassifier, SourceId, StreamConfig,
    StreamController, StreamEvent, StreamRegistry, default_playback, shared,
};

/// 多路视频暴力行为检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ONNX模型文件路径
    #[arg(long, value_name = "PATH", default_value = DEFAULT_MODEL_PATH)]
    model: String,

    /// 报警音频（WAV）路径
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ALARM_PATH)]
    alarm: PathBuf,

    /// 视频源：摄像头编号、图片文件/目录或 synthetic:N，可重复，默认 0 1 2 3
    #[arg(long = "source", value_name = "ID")]
    sources: Vec<SourceId>,

    /// 每次推理的帧数
    #[arg(long, value_name = "FRAMES", default_value_t = WINDOW_LEN)]
    window: usize,

    /// 模型输入的边长（正方形）
    #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_INPUT_WIDTH)]
    size: usize,

    /// 每次迭代后的等待时间
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_PACING_MS)]
    pacing_ms: u64,

    /// 同一路流两次报警之间的最短间隔
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_ALARM_COOLDOWN_MS)]
    alarm_cooldown_ms: u64,

    /// 最多同时播放的报警数
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_CONCURRENT_ALARMS)]
    max_alarms: usize,

    /// 按模型输出顺序排列的类别名
    #[arg(long, value_delimiter = ',', default_value = "NonViolence,Violence")]
    labels: Vec<String>,

    /// 触发报警的类别
    #[arg(long, default_value = DEFAULT_ALERT_LABEL)]
    alert_label: String,

    /// 按红-绿-蓝顺序输入模型（默认蓝-绿-红）
    #[arg(long)]
    rgb: bool,
}

impl Args {
    fn detector_config(&self) -> DetectorConfig {
        let order = if self.rgb { ChannelOrder::Rgb } else { ChannelOrder::Bgr };
        DetectorConfig::default()
            .with_window_len(self.window)
            .with_input_size(self.size, self.size)
            .with_channel_order(order)
            .with_labels(self.labels.iter())
            .with_alert_label(self.alert_label.as_str())
            .with_pacing(Duration::from_millis(self.pacing_ms))
            .with_alarm_cooldown(Duration::from_millis(self.alarm_cooldown_ms))
    }

    fn sources(&self) -> Vec<SourceId> {
        if self.sources.is_empty() {
            (0..4).map(SourceId::Device).collect()
        } else {
            self.sources.clone()
        }
    }
}

/// 展示层：记录每路流的标签变化
fn watch_labels(controller: &StreamController) {
    let mut frames = controller.subscribe_frames();
    let title = controller.title().to_string();
    tokio::spawn(async move {
        let mut last: Option<String> = None;
        while frames.changed().await.is_ok() {
            let label = frames
                .borrow_and_update()
                .as_ref()
                .and_then(|frame| frame.prediction.as_ref())
                .map(|prediction| prediction.label.clone());
            if label.is_some() && label != last {
                info!("[{}] {}", title, label.as_deref().unwrap_or_default());
                last = label;
            }
        }
    });
}

fn log_event(event: &StreamEvent) {
    match event {
        StreamEvent::Started { title, .. } => info!("[{}] 已启动", title),
        StreamEvent::Alarm { title, confidence, .. } => {
            warn!("[{}] 报警 (置信度 {:.2})", title, confidence)
        }
        StreamEvent::Error { title, message, .. } => error!("[{}] {}", title, message),
        StreamEvent::Stopped { title, reason, .. } => info!("[{}] 已停止: {}", title, reason),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let detector = args.detector_config();

    info!("模型文件路径: {}", args.model);
    let classifier = match OnnxClassifier::load(&args.model, detector.labels().len()) {
        Ok(classifier) => classifier,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let alarm = AlarmPlayer::load(&args.alarm, default_playback(), args.max_alarms);

    let mut registry = StreamRegistry::new(shared(classifier), alarm);
    for source in args.sources() {
        registry.add_stream(StreamConfig::new(source).with_detector(detector.clone()));
    }
    let mut events = registry.events().context("事件通道已被取走")?;
    for controller in registry.controllers() {
        watch_labels(controller);
    }

    let failures = registry.start_all();
    let mut active = registry.len() - failures.len();
    if active == 0 {
        bail!("没有可用的视频源");
    }
    info!("{} 路流正在检测，按 Ctrl-C 退出", active);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("收到中断信号，正在停止所有流...");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
                if let StreamEvent::Stopped { .. } = event {
                    active = active.saturating_sub(1);
                    if active == 0 {
                        info!("所有流都已结束");
                        break;
                    }
                }
            }
        }
    }

    tokio::task::block_in_place(|| registry.stop_all());
    Ok(())
}
