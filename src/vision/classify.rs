use std::sync::{Arc, Mutex};
use std::time::Instant;

use ndarray::Array5;
use ort::session::Session;

use crate::error::ClassifierError;
use crate::vision::infer::run_inference;
use crate::vision::model::load_model;

/// 视频分类器
///
/// 输入一个窗口堆叠成的张量，输出各类别的概率。类别的下标顺序必须和模型训练时的标签
/// 顺序一致，分类器本身不做校验。
pub trait Classifier: Send {
    fn classify(&mut self, window: &Array5<f32>) -> Result<Vec<f32>, ClassifierError>;
}

/// 所有流共用的分类器
///
/// `ort::Session::run` 需要可变借用，所以推理调用通过互斥锁串行化。
pub type SharedClassifier = Arc<Mutex<dyn Classifier>>;

/// 把分类器包装成多路流共用的形式
pub fn shared<C: Classifier + 'static>(classifier: C) -> SharedClassifier {
    Arc::new(Mutex::new(classifier))
}

/// 基于ONNX模型的分类器
///
/// # 示例
///
/// ```no_run
/// use vigil::vision::OnnxClassifier;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let classifier = OnnxClassifier::load("model.onnx", 2)?;
/// # Ok(())
/// # }
/// ```
pub struct OnnxClassifier {
    /// ONNX模型会话
    model: Session,
    /// 模型输出的类别数
    num_classes: usize,
}

impl OnnxClassifier {
    pub fn new(model: Session, num_classes: usize) -> Self {
        Self { model, num_classes }
    }

    /// 从文件加载模型
    pub fn load(model_path: &str, num_classes: usize) -> Result<Self, ClassifierError> {
        let model = load_model(model_path)?;
        log::info!("已加载模型 {}", model_path);
        Ok(Self::new(model, num_classes))
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&mut self, window: &Array5<f32>) -> Result<Vec<f32>, ClassifierError> {
        let start_time = Instant::now();
        let probabilities = run_inference(&mut self.model, window, self.num_classes)?;
        log::debug!("模型推理耗时: {:?}", start_time.elapsed());
        Ok(probabilities)
    }
}

/// 取概率最大的类别下标，相等时取下标最小的，空向量返回 `None`
///
/// NaN视为最大值：向量里有NaN时返回第一个NaN的下标，与numpy的 `argmax` 一致。
pub fn predicted_label(probabilities: &[f32]) -> Option<usize> {
    if let Some(index) = probabilities.iter().position(|p| p.is_nan()) {
        return Some(index);
    }
    let mut best: Option<(usize, f32)> = None;
    for (index, &p) in probabilities.iter().enumerate() {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((index, p)),
        }
    }
    best.map(|(index, _)| index)
}

/// 一次预测的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// 根据概率向量和标签列表生成预测结果
    ///
    /// 概率向量为空时返回 `None`。下标超出标签列表时用下标本身作为名字。
    pub fn from_probabilities(probabilities: Vec<f32>, labels: &[String]) -> Option<Self> {
        let index = predicted_label(&probabilities)?;
        let label = labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index));
        Some(Self {
            index,
            label,
            probabilities,
        })
    }

    pub fn confidence(&self) -> f32 {
        self.probabilities.get(self.index).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["NonViolence".to_string(), "Violence".to_string()]
    }

    #[test]
    fn test_argmax() {
        assert_eq!(predicted_label(&[0.3, 0.7]), Some(1));
        assert_eq!(predicted_label(&[0.7, 0.3]), Some(0));
        assert_eq!(predicted_label(&[0.1, 0.2, 0.6, 0.1]), Some(2));
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        assert_eq!(predicted_label(&[0.5, 0.5]), Some(0));
        assert_eq!(predicted_label(&[0.2, 0.4, 0.4]), Some(1));
    }

    #[test]
    fn test_first_nan_wins() {
        assert_eq!(predicted_label(&[0.3, f32::NAN, 0.9]), Some(1));
        assert_eq!(predicted_label(&[f32::NAN, f32::NAN]), Some(0));
    }

    #[test]
    fn test_empty_vector_has_no_label() {
        assert_eq!(predicted_label(&[]), None);
        assert_eq!(Prediction::from_probabilities(vec![], &labels()), None);
    }

    #[test]
    fn test_prediction_names() {
        let violence = Prediction::from_probabilities(vec![0.3, 0.7], &labels()).unwrap();
        assert_eq!(violence.label, "Violence");
        assert_eq!(violence.confidence(), 0.7);

        let calm = Prediction::from_probabilities(vec![0.7, 0.3], &labels()).unwrap();
        assert_eq!(calm.label, "NonViolence");

        let tie = Prediction::from_probabilities(vec![0.5, 0.5], &labels()).unwrap();
        assert_eq!(tie.label, "NonViolence");
    }

    #[test]
    fn test_unknown_index_gets_generic_name() {
        let prediction = Prediction::from_probabilities(vec![0.1, 0.1, 0.8], &labels()).unwrap();
        assert_eq!(prediction.label, "class_2");
    }

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let result = OnnxClassifier::load("/definitely/not/here/model.onnx", 2);
        assert!(matches!(result, Err(ClassifierError::ModelLoad { .. })));
    }
}
