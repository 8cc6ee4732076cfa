use ndarray::Array5;
use ort::{inputs, session::Session};

use crate::error::ClassifierError;
use crate::vision::array::to_input;

/// 运行模型推理
///
/// 使用ONNX模型对一个窗口的输入进行推理，返回各类别的概率。
///
/// # 参数
/// * `model` - ONNX模型Session
/// * `input` - 输入张量，形状应为(1, frames, height, width, 3)
/// * `num_classes` - 期望的类别数
///
/// # 返回值
/// 返回长度为 `num_classes` 的概率向量
///
/// # 错误处理
/// 推理失败返回 `ClassifierError::Inference`，输出形状不是 [1, num_classes] 时返回
/// `ClassifierError::Shape`
pub fn run_inference(
    model: &mut Session,
    input: &Array5<f32>,
    num_classes: usize,
) -> Result<Vec<f32>, ClassifierError> {
    let input_tensor = to_input(input)?;
    let outputs = model.run(inputs![input_tensor])?;

    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let dims: Vec<i64> = shape.iter().copied().collect();
    if dims.len() != 2 || dims[0] != 1 || dims[1] as usize != num_classes {
        return Err(ClassifierError::Shape(format!(
            "期望 [1, {}]，实际 {:?}",
            num_classes, dims
        )));
    }

    Ok(data.to_vec())
}
