use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use image::RgbImage;
use tokio::sync::{mpsc, watch};

use crate::alarm::AlarmPlayer;
use crate::config::{DetectorConfig, StreamConfig, default_title};
use crate::error::StreamError;
use crate::source::{FrameSource, SourceOpener, default_opener};
use crate::utils::{LoopExit, LoopStep, LoopTask, LoopToken, MultiLoop, SlidingWindow};
use crate::vision::{Prediction, PreprocessedFrame, SharedClassifier, draw_label, preprocess};

pub type StreamId = usize;

/// 单路流的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// 未运行，视频源已释放，可以再次启动
    Idle,
    /// 检测循环正在运行
    Detecting,
    /// 已请求停止，等待循环收尾
    Stopping,
}

/// 检测循环结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 调用了 `stop`
    Requested,
    /// 视频读完了
    EndOfStream,
    /// 读取、推理失败或循环panic
    Failed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => write!(f, "已请求停止"),
            StopReason::EndOfStream => write!(f, "视频结束"),
            StopReason::Failed(msg) => write!(f, "出错: {}", msg),
        }
    }
}

/// 发给展示层的事件
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Started { stream: StreamId, title: String },
    Alarm { stream: StreamId, title: String, confidence: f32 },
    Error { stream: StreamId, title: String, message: String },
    Stopped { stream: StreamId, title: String, reason: StopReason },
}

impl StreamEvent {
    pub fn stream(&self) -> StreamId {
        match self {
            StreamEvent::Started { stream, .. }
            | StreamEvent::Alarm { stream, .. }
            | StreamEvent::Error { stream, .. }
            | StreamEvent::Stopped { stream, .. } => *stream,
        }
    }
}

/// 写好标签、等待展示的一帧
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub stream: StreamId,
    pub seq: u64,
    pub image: RgbImage,
    /// 窗口未满时没有预测结果
    pub prediction: Option<Prediction>,
}

/// 单路流的计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StreamStats {
    pub frames_read: u64,
    pub frames_rendered: u64,
    pub inferences: u64,
    pub alarms: u64,
}

type FrameSender = Arc<watch::Sender<Option<Arc<RenderedFrame>>>>;

/// 控制器与检测线程共享的状态
struct Shared {
    state: Mutex<StreamState>,
    stats: Mutex<StreamStats>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn stats(&self) -> MutexGuard<'_, StreamStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 单路流的控制器
///
/// 持有一个视频源标识、一份检测配置和共享的分类器与报警播放器，
/// `start` 之后在独立线程上循环：读帧、预处理、放入窗口、窗口满后推理、
/// 需要时报警、写标签并发布。`stop` 可以在任何时候重复调用。
pub struct StreamController {
    id: StreamId,
    title: String,
    config: StreamConfig,
    classifier: SharedClassifier,
    alarm: AlarmPlayer,
    opener: SourceOpener,
    events: mpsc::UnboundedSender<StreamEvent>,
    frames: FrameSender,
    shared: Arc<Shared>,
    worker: MultiLoop,
}

impl StreamController {
    /// 创建控制器，创建后处于 `Idle` 状态
    ///
    /// # 参数
    /// * `id` - 流编号，也决定默认标题
    /// * `config` - 该路流的配置
    /// * `classifier` - 所有流共用的分类器
    /// * `alarm` - 所有流共用的报警播放器
    /// * `events` - 生命周期事件发往的通道
    pub fn new(
        id: StreamId,
        config: StreamConfig,
        classifier: SharedClassifier,
        alarm: AlarmPlayer,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        let title = config
            .title()
            .map(|t| t.to_string())
            .unwrap_or_else(|| default_title(id));
        let (frames, _) = watch::channel(None);

        Self {
            id,
            title,
            config,
            classifier,
            alarm,
            opener: default_opener(),
            events,
            frames: Arc::new(frames),
            shared: Arc::new(Shared {
                state: Mutex::new(StreamState::Idle),
                stats: Mutex::new(StreamStats::default()),
            }),
            worker: MultiLoop::new(),
        }
    }

    /// 替换打开视频源的方式
    pub fn with_opener(mut self, opener: SourceOpener) -> Self {
        self.opener = opener;
        self
    }

    /// 启动检测
    ///
    /// 已经在检测时什么也不做。先打开视频源，打开失败时返回错误、保持 `Idle`，
    /// 不会创建检测线程。不会等待检测循环。
    pub fn start(&mut self) -> Result<(), StreamError> {
        // 循环已自行退出但还没收尾时状态仍是 Detecting，要以线程是否在运行为准
        if self.worker.is_running() && *self.shared.state() == StreamState::Detecting {
            return Ok(());
        }
        // 等上一次的循环收尾完毕
        self.worker.join();

        let source = match (self.opener)(self.config.source()) {
            Ok(source) => source,
            Err(e) => {
                log::error!("[{}] {}", self.title, e);
                self.emit(StreamEvent::Error {
                    stream: self.id,
                    title: self.title.clone(),
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let detector = self.config.detector().clone();
        let pacing = detector.pacing();
        let task = Detection {
            stream: self.id,
            title: self.title.clone(),
            source,
            window: SlidingWindow::new(detector.window_len()),
            config: detector,
            classifier: Arc::clone(&self.classifier),
            alarm: self.alarm.clone(),
            last_alarm: None,
            frames: Arc::clone(&self.frames),
            events: self.events.clone(),
            shared: Arc::clone(&self.shared),
        };

        *self.shared.state() = StreamState::Detecting;
        self.emit(StreamEvent::Started {
            stream: self.id,
            title: self.title.clone(),
        });

        let name = format!("stream-{}", self.id);
        if let Err(e) = self.worker.start(&name, pacing, task) {
            // 任务随线程闭包一起被丢弃，视频源也随之释放
            *self.shared.state() = StreamState::Idle;
            log::error!("[{}] 无法创建检测线程: {}", self.title, e);
            self.emit(StreamEvent::Error {
                stream: self.id,
                title: self.title.clone(),
                message: e.to_string(),
            });
            return Err(e.into());
        }

        log::info!("[{}] 开始检测 {}", self.title, self.config.source());
        Ok(())
    }

    /// 停止检测
    ///
    /// 可以重复调用，也可以在从未启动或循环已自行结束时调用。返回时视频源已释放，
    /// 状态为 `Idle`。最多等待一次迭代的时间。
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state();
            if *state == StreamState::Detecting {
                *state = StreamState::Stopping;
            }
        }
        self.worker.stop();
        self.worker.join();
        *self.shared.state() = StreamState::Idle;
    }

    /// 等待检测循环自行结束（例如视频读完）
    pub fn join(&mut self) {
        self.worker.join();
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        *self.shared.state()
    }

    pub fn stats(&self) -> StreamStats {
        *self.shared.stats()
    }

    /// 订阅最新画面，展示层按自己的节奏读取
    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<RenderedFrame>>> {
        self.frames.subscribe()
    }

    /// 最近发布的一帧
    pub fn latest_frame(&self) -> Option<Arc<RenderedFrame>> {
        self.frames.borrow().clone()
    }

    /// 最近发布的一帧上的预测结果
    pub fn latest_prediction(&self) -> Option<Prediction> {
        self.frames
            .borrow()
            .as_ref()
            .and_then(|frame| frame.prediction.clone())
    }

    fn emit(&self, event: StreamEvent) {
        // 展示层已经退出时丢弃事件
        let _ = self.events.send(event);
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 在检测线程上运行的循环体，独占视频源和滑动窗口
struct Detection {
    stream: StreamId,
    title: String,
    source: Box<dyn FrameSource>,
    window: SlidingWindow<PreprocessedFrame>,
    config: DetectorConfig,
    classifier: SharedClassifier,
    alarm: AlarmPlayer,
    last_alarm: Option<Instant>,
    frames: FrameSender,
    events: mpsc::UnboundedSender<StreamEvent>,
    shared: Arc<Shared>,
}

impl Detection {
    fn classify(&mut self, token: &LoopToken) -> Result<Option<Prediction>, StopReason> {
        let Some(batch) = self.window.stacked() else {
            return Ok(None);
        };
        // 收到停止请求后不再推理
        if !token.is_running() {
            return Err(StopReason::Requested);
        }

        let probabilities = {
            let mut classifier = self.classifier.lock().unwrap_or_else(|e| e.into_inner());
            classifier.classify(&batch)
        }
        .map_err(|e| StopReason::Failed(e.to_string()))?;
        self.shared.stats().inferences += 1;

        let prediction = Prediction::from_probabilities(probabilities, self.config.labels())
            .ok_or_else(|| StopReason::Failed("模型输出了空的概率向量".to_string()))?;
        log::debug!(
            "[{}] {} ({:.2})",
            self.title,
            prediction.label,
            prediction.confidence()
        );
        Ok(Some(prediction))
    }

    /// 冷却时间内不重复报警
    ///
    /// 报警事件只受冷却时间限制，声音能否播放不影响事件。
    fn raise_alarm(&mut self, confidence: f32) {
        let cooled = self
            .last_alarm
            .is_none_or(|at| at.elapsed() >= self.config.alarm_cooldown());
        if !cooled {
            return;
        }
        self.last_alarm = Some(Instant::now());
        self.shared.stats().alarms += 1;
        log::warn!("[{}] 检测到 {}", self.title, self.config.alert_label());
        let _ = self.events.send(StreamEvent::Alarm {
            stream: self.stream,
            title: self.title.clone(),
            confidence,
        });

        if !self.alarm.trigger_detached() {
            log::debug!("[{}] 本次报警没有播放声音", self.title);
        }
    }
}

impl LoopTask for Detection {
    type Exit = StopReason;

    fn step(&mut self, token: &LoopToken) -> LoopStep<StopReason> {
        let frame = match self.source.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return LoopStep::Break(StopReason::EndOfStream),
            Err(e) => return LoopStep::Break(StopReason::Failed(e.to_string())),
        };
        self.shared.stats().frames_read += 1;

        self.window.push(preprocess(&frame, &self.config));

        let prediction = match self.classify(token) {
            Ok(prediction) => prediction,
            Err(reason) => return LoopStep::Break(reason),
        };

        let image = match &prediction {
            Some(p) => {
                let alert = p.label == self.config.alert_label();
                if alert {
                    self.raise_alarm(p.confidence());
                }
                draw_label(&frame.image, &p.label, alert)
            }
            None => frame.image,
        };

        self.frames.send_replace(Some(Arc::new(RenderedFrame {
            stream: self.stream,
            seq: frame.seq,
            image,
            prediction,
        })));
        self.shared.stats().frames_rendered += 1;

        LoopStep::Continue
    }

    fn finish(mut self, exit: LoopExit<StopReason>) {
        self.source.close();
        self.window.clear();
        *self.shared.state() = StreamState::Idle;

        let reason = match exit {
            LoopExit::Stopped => StopReason::Requested,
            LoopExit::Finished(reason) => reason,
            LoopExit::Panicked(msg) => StopReason::Failed(format!("panic: {}", msg)),
        };
        match &reason {
            StopReason::Failed(msg) => {
                log::error!("[{}] 检测中止: {}", self.title, msg);
                let _ = self.events.send(StreamEvent::Error {
                    stream: self.stream,
                    title: self.title.clone(),
                    message: msg.clone(),
                });
            }
            _ => log::info!("[{}] 检测结束: {}", self.title, reason),
        }
        let _ = self.events.send(StreamEvent::Stopped {
            stream: self.stream,
            title: self.title,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::source::SourceId;
    use crate::vision::{Classifier, shared};
    use ndarray::Array5;
    use std::time::Duration;

    /// 固定输出某个类别的分类器
    struct Fixed(Vec<f32>);

    impl Classifier for Fixed {
        fn classify(&mut self, _window: &Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Classifier for Broken {
        fn classify(&mut self, _window: &Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
            Err(ClassifierError::Shape("expected [1, 2], got [1, 3]".to_string()))
        }
    }

    fn config(frames: u64) -> StreamConfig {
        StreamConfig::new(SourceId::Synthetic { frames, width: 32, height: 24 }).with_detector(
            DetectorConfig::default()
                .with_window_len(4)
                .with_pacing(Duration::ZERO),
        )
    }

    fn controller(
        frames: u64,
        classifier: SharedClassifier,
    ) -> (StreamController, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller =
            StreamController::new(0, config(frames), classifier, AlarmPlayer::unavailable(), tx);
        (controller, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_new_controller_is_idle() {
        let (controller, _rx) = controller(1, shared(Fixed(vec![1.0, 0.0])));
        assert_eq!(controller.state(), StreamState::Idle);
        assert_eq!(controller.title(), "Stream 1 (Webcam)");
        assert_eq!(controller.stats(), StreamStats::default());
        assert!(controller.latest_frame().is_none());
    }

    #[test]
    fn test_runs_to_end_of_stream() {
        let (mut controller, mut rx) = controller(10, shared(Fixed(vec![0.9, 0.1])));
        controller.start().unwrap();
        controller.join();

        assert_eq!(controller.state(), StreamState::Idle);
        let stats = controller.stats();
        assert_eq!(stats.frames_read, 10);
        assert_eq!(stats.frames_rendered, 10);
        assert_eq!(stats.inferences, 7);

        let last = controller.latest_frame().unwrap();
        assert_eq!(last.seq, 10);
        assert_eq!(last.prediction.as_ref().unwrap().label, "NonViolence");

        let events = drain(&mut rx);
        assert!(matches!(events.first(), Some(StreamEvent::Started { .. })));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Stopped { reason: StopReason::EndOfStream, .. })
        ));
    }

    #[test]
    fn test_frames_before_full_window_have_no_prediction() {
        let (mut controller, _rx) = controller(3, shared(Fixed(vec![0.0, 1.0])));
        controller.start().unwrap();
        controller.join();

        assert_eq!(controller.stats().inferences, 0);
        assert!(controller.latest_frame().unwrap().prediction.is_none());
    }

    #[test]
    fn test_classifier_failure_stops_stream() {
        let (mut controller, mut rx) = controller(10, shared(Broken));
        controller.start().unwrap();
        controller.join();

        assert_eq!(controller.state(), StreamState::Idle);
        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Stopped { reason: StopReason::Failed(_), .. })
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut controller, _rx) = controller(u64::MAX, shared(Fixed(vec![1.0, 0.0])));
        controller.stop();
        assert_eq!(controller.state(), StreamState::Idle);

        controller.start().unwrap();
        assert_eq!(controller.state(), StreamState::Detecting);
        controller.start().unwrap();

        controller.stop();
        assert_eq!(controller.state(), StreamState::Idle);
        controller.stop();
        assert_eq!(controller.state(), StreamState::Idle);
    }

    fn alarm_count(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> usize {
        drain(rx)
            .iter()
            .filter(|e| matches!(e, StreamEvent::Alarm { .. }))
            .count()
    }

    fn violent(cooldown: Duration) -> (StreamController, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = StreamConfig::new(SourceId::Synthetic { frames: 20, width: 32, height: 24 })
            .with_detector(
                DetectorConfig::default()
                    .with_window_len(4)
                    .with_pacing(Duration::ZERO)
                    .with_alarm_cooldown(cooldown),
            );
        let controller = StreamController::new(
            0,
            config,
            shared(Fixed(vec![0.1, 0.9])),
            AlarmPlayer::unavailable(),
            tx,
        );
        (controller, rx)
    }

    #[test]
    fn test_alarm_event_without_sound() {
        let (mut controller, mut rx) = violent(Duration::from_secs(60));
        controller.start().unwrap();
        controller.join();

        assert_eq!(controller.stats().inferences, 17);
        assert_eq!(controller.stats().alarms, 1);
        assert_eq!(alarm_count(&mut rx), 1);
    }

    #[test]
    fn test_alarm_event_every_window_without_cooldown() {
        let (mut controller, mut rx) = violent(Duration::ZERO);
        controller.start().unwrap();
        controller.join();

        assert_eq!(controller.stats().alarms, 17);
        assert_eq!(alarm_count(&mut rx), 17);
    }

    #[test]
    fn test_start_restarts_loop_that_exited_before_cleanup() {
        let (mut controller, _rx) = controller(5, shared(Fixed(vec![1.0, 0.0])));
        // 循环线程已退出、收尾还没把状态改回 Idle
        *controller.shared.state() = StreamState::Detecting;
        assert!(!controller.worker.is_running());

        controller.start().unwrap();
        controller.join();
        assert_eq!(controller.stats().frames_read, 5);
        assert_eq!(controller.state(), StreamState::Idle);
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Failed("x".to_string()).to_string(), "出错: x");
    }
}
