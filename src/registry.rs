use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::alarm::AlarmPlayer;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::source::{SourceOpener, default_opener};
use crate::stream::{StreamController, StreamEvent, StreamId};
use crate::vision::SharedClassifier;

/// 多路流的注册表
///
/// 所有流共用同一个分类器和报警播放器，生命周期事件汇总到同一个通道。
/// 各路流互相独立，一路失败不影响其他路。注册表被丢弃时会停止所有流。
pub struct StreamRegistry {
    classifier: SharedClassifier,
    alarm: AlarmPlayer,
    opener: SourceOpener,
    streams: BTreeMap<StreamId, StreamController>,
    next_id: StreamId,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
}

impl StreamRegistry {
    pub fn new(classifier: SharedClassifier, alarm: AlarmPlayer) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            classifier,
            alarm,
            opener: default_opener(),
            streams: BTreeMap::new(),
            next_id: 0,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// 替换之后加入的流打开视频源的方式
    pub fn with_opener(mut self, opener: SourceOpener) -> Self {
        self.opener = opener;
        self
    }

    /// 加入一路流，返回它的编号。编号按加入顺序从0开始
    pub fn add_stream(&mut self, config: StreamConfig) -> StreamId {
        let id = self.next_id;
        self.next_id += 1;

        let controller = StreamController::new(
            id,
            config,
            self.classifier.clone(),
            self.alarm.clone(),
            self.events_tx.clone(),
        )
        .with_opener(self.opener.clone());
        log::debug!("已注册 {}: {}", controller.title(), controller.config().source());
        self.streams.insert(id, controller);
        id
    }

    pub fn start(&mut self, id: StreamId) -> Result<(), StreamError> {
        self.streams
            .get_mut(&id)
            .ok_or(StreamError::UnknownStream(id))?
            .start()
    }

    pub fn stop(&mut self, id: StreamId) -> Result<(), StreamError> {
        self.streams
            .get_mut(&id)
            .ok_or(StreamError::UnknownStream(id))?
            .stop();
        Ok(())
    }

    /// 启动所有流
    ///
    /// 某一路启动失败时继续启动其余的流。
    ///
    /// # 返回值
    /// 启动失败的流和对应的错误
    pub fn start_all(&mut self) -> Vec<(StreamId, StreamError)> {
        let mut failures = Vec::new();
        for (id, controller) in self.streams.iter_mut() {
            if let Err(e) = controller.start() {
                log::warn!("{} 启动失败: {}", controller.title(), e);
                failures.push((*id, e));
            }
        }
        failures
    }

    /// 停止所有流，返回时所有视频源都已释放
    pub fn stop_all(&mut self) {
        for controller in self.streams.values_mut() {
            controller.stop();
        }
    }

    pub fn controller(&self, id: StreamId) -> Option<&StreamController> {
        self.streams.get(&id)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &StreamController> {
        self.streams.values()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// 取走事件接收端，只能取一次
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<StreamEvent>> {
        self.events_rx.take()
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use crate::source::SourceId;
    use crate::stream::StreamState;
    use crate::vision::{Classifier, shared};
    use ndarray::Array5;

    struct Fixed;

    impl Classifier for Fixed {
        fn classify(&mut self, _window: &Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn registry() -> StreamRegistry {
        StreamRegistry::new(shared(Fixed), AlarmPlayer::unavailable())
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut registry = registry();
        assert!(registry.is_empty());
        let a = registry.add_stream(StreamConfig::new(SourceId::synthetic(1)));
        let b = registry.add_stream(StreamConfig::new(SourceId::synthetic(1)));
        assert_eq!((a, b), (0, 1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.controller(1).unwrap().title(), "Stream 2 (USB Camera)");
    }

    #[test]
    fn test_unknown_stream() {
        let mut registry = registry();
        assert!(matches!(registry.start(9), Err(StreamError::UnknownStream(9))));
        assert!(matches!(registry.stop(9), Err(StreamError::UnknownStream(9))));
    }

    #[test]
    fn test_events_can_be_taken_once() {
        let mut registry = registry();
        assert!(registry.events().is_some());
        assert!(registry.events().is_none());
    }

    #[test]
    fn test_start_all_reports_failures_and_keeps_going() {
        let mut registry = registry();
        let good = registry.add_stream(StreamConfig::new(SourceId::synthetic(u64::MAX)));
        let bad = registry.add_stream(StreamConfig::new("/definitely/not/here".parse().unwrap()));

        let failures = registry.start_all();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, bad);
        assert_eq!(registry.controller(good).unwrap().state(), StreamState::Detecting);
        assert_eq!(registry.controller(bad).unwrap().state(), StreamState::Idle);

        registry.stop_all();
        assert!(registry.controllers().all(|c| c.state() == StreamState::Idle));
    }
}
