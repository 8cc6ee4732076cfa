//! 数组处理模块
//!
//! 提供将ndarray数组转换为ONNX Runtime张量的功能。

use ndarray::Array5;
use ort::value::Tensor;

use crate::error::ClassifierError;

/// 将滑动窗口堆叠出的五维数组转换为ONNX Runtime张量
///
/// # 参数
/// * `mats` - 五维数组，形状为(1, frames, height, width, 3)
pub fn to_input(mats: &Array5<f32>) -> Result<Tensor<f32>, ClassifierError> {
    let shape: Vec<usize> = mats.shape().to_vec();
    // 保证内存布局是标准行优先顺序
    let data: Vec<f32> = mats.iter().copied().collect();
    let tensor = Tensor::from_array((
        [shape[0], shape[1], shape[2], shape[3], shape[4]],
        data,
    ))?;
    Ok(tensor)
}
