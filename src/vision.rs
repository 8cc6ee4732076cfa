//! Vision模块 - 基于滑动窗口的视频分类
//!
//! 该模块提供了一整套视频分类功能，包括：
//! - 模型加载
//! - 帧预处理（缩放、归一化）
//! - 模型推理
//! - 取概率最大的类别
//! - 在画面上写标签
//!
//! # 工作流程
//!
//! 1. 使用 `OnnxClassifier::load` 加载ONNX模型
//! 2. 每一帧用 `preprocess` 处理后放进 `SlidingWindow`
//! 3. 窗口满后把 `stacked()` 的结果交给 `Classifier::classify`
//! 4. 用 `Prediction::from_probabilities` 得到标签
//! 5. 使用 `draw_label` 把标签写到画面上
//!
//! # 示例
//!
//! ```no_run
//! use vigil::config::DetectorConfig;
//! use vigil::source::{FrameSource, SyntheticSource};
//! use vigil::utils::SlidingWindow;
//! use vigil::vision::{Classifier, OnnxClassifier, Prediction, draw_label, preprocess};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DetectorConfig::default();
//! let mut classifier = OnnxClassifier::load("model.onnx", config.labels().len())?;
//! let mut window = SlidingWindow::new(config.window_len());
//! let mut source = SyntheticSource::new(32, 320, 240);
//!
//! while let Some(frame) = source.read_frame()? {
//!     window.push(preprocess(&frame, &config));
//!     if let Some(batch) = window.stacked() {
//!         let probabilities = classifier.classify(&batch)?;
//!         if let Some(prediction) = Prediction::from_probabilities(probabilities, config.labels()) {
//!             let _rendered = draw_label(&frame.image, &prediction.label, false);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod array;
pub mod classify;
pub mod glyphs;
pub mod image;
pub mod infer;
pub mod model;
pub mod overlay;

// 重新导出常用类型和函数
pub use classify::{Classifier, OnnxClassifier, Prediction, SharedClassifier, predicted_label, shared};
pub use self::image::{PreprocessedFrame, preprocess};
pub use model::load_model;
pub use overlay::draw_label;
