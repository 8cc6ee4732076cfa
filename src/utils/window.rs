use std::collections::VecDeque;

use ndarray::{Array3, Array5, ArrayView3, Axis, stack};

/// 固定容量的滑动窗口
///
/// 按到达顺序保存最近 `capacity` 个元素。窗口已满时写入新元素会先丢弃最旧的一个，
/// 长度永远不会超过容量。
pub struct SlidingWindow<T> {
    pool: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> SlidingWindow<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pool: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 追加一个元素，满时先淘汰最旧的元素
    pub fn push(&mut self, item: T) {
        if self.pool.len() == self.capacity {
            self.pool.pop_front();
        }
        self.pool.push_back(item);
    }

    pub fn is_full(&self) -> bool {
        self.pool.len() == self.capacity
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.pool.clear();
    }

    /// 窗口已满时返回全部元素的拷贝（从旧到新），否则返回 `None`
    pub fn snapshot(&self) -> Option<Vec<T>> {
        if !self.is_full() {
            return None;
        }
        Some(self.pool.iter().cloned().collect())
    }
}

impl SlidingWindow<Array3<f32>> {
    /// 把窗口内的帧堆叠成模型输入，形状为 (1, N, H, W, C)
    ///
    /// 窗口未满或帧尺寸不一致时返回 `None`。
    pub fn stacked(&self) -> Option<Array5<f32>> {
        if !self.is_full() {
            return None;
        }
        let views: Vec<ArrayView3<f32>> = self.pool.iter().map(|frame| frame.view()).collect();
        let batch = stack(Axis(0), &views).ok()?;
        Some(batch.insert_axis(Axis(0)))
    }
}
