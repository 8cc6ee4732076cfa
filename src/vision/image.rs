use image::{RgbImage, imageops::{self, FilterType}};
use ndarray::Array3;

use crate::config::{ChannelOrder, DetectorConfig};
use crate::source::Frame;

/// 预处理后的一帧，形状为 (height, width, 3)，值在 [0, 1] 之间
pub type PreprocessedFrame = Array3<f32>;

/// 调整图像大小以适应模型输入
///
/// 使用Triangle插值算法将图像调整为指定尺寸，不保持宽高比。
pub fn resize_image(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    imageops::resize(img, width, height, FilterType::Triangle)
}

/// 将图像转换为单帧张量
///
/// 1. 归一化像素值到[0, 1]范围
/// 2. 按 `order` 排列通道
/// 3. 维度顺序为HWC
///
/// # 返回值
/// 返回形状为(height, width, 3)的三维张量
pub fn image_to_tensor(img: &RgbImage, order: ChannelOrder) -> PreprocessedFrame {
    let (width, height) = img.dimensions();
    let mut tensor = Array3::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let channels = match order {
            ChannelOrder::Rgb => [r, g, b],
            ChannelOrder::Bgr => [b, g, r],
        };
        for (c, value) in channels.into_iter().enumerate() {
            tensor[[y as usize, x as usize, c]] = value as f32 / 255.0;
        }
    }

    tensor
}

/// 把一帧画面处理成模型需要的输入：缩放到配置的分辨率并归一化
pub fn preprocess(frame: &Frame, config: &DetectorConfig) -> PreprocessedFrame {
    let resized = resize_image(
        &frame.image,
        config.input_width() as u32,
        config.input_height() as u32,
    );
    image_to_tensor(&resized, config.channel_order())
}
