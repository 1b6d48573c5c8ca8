use crate::core::video::phash::{dct_phash, hamming_distance};

/// 相邻采样帧的差异预筛
///
/// pHash 汉明距离与灰度直方图各占一半权重，
/// 综合得分低于阈值的帧按近重复丢弃。
pub struct FrameDiffFilter {
    threshold: f32,
    last_hash: Option<u64>,
    last_histogram: Option<[u32; 64]>,
}

impl FrameDiffFilter {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            last_hash: None,
            last_histogram: None,
        }
    }

    /// 与上一保留帧差异足够大时返回 true
    pub fn should_process(&mut self, gray: &[u8], width: u32, height: u32) -> bool {
        let current_hash = dct_phash(gray, width, height);
        let current_histogram = Self::histogram(gray);

        let should_process = if let (Some(last_hash), Some(last_hist)) =
            (self.last_hash, self.last_histogram)
        {
            let hash_diff = hamming_distance(current_hash, last_hash) as f32 / 64.0;
            let hist_diff = Self::histogram_similarity(&current_histogram, &last_hist);

            let combined_score = hash_diff * 0.5 + (1.0 - hist_diff) * 0.5;
            combined_score > self.threshold
        } else {
            true
        };

        if should_process {
            self.last_hash = Some(current_hash);
            self.last_histogram = Some(current_histogram);
        }

        should_process
    }

    fn histogram(gray: &[u8]) -> [u32; 64] {
        let mut hist = [0u32; 64];
        for &val in gray {
            hist[(val >> 2) as usize] += 1;
        }
        hist
    }

    fn histogram_similarity(h1: &[u32; 64], h2: &[u32; 64]) -> f32 {
        let dot: u32 = h1.iter().zip(h2.iter()).map(|(a, b)| a.min(b)).sum();
        let sum1: u32 = h1.iter().sum();
        let sum2: u32 = h2.iter().sum();

        if sum1 == 0 || sum2 == 0 {
            return 0.0;
        }
        dot as f32 / sum1.max(sum2) as f32
    }

    pub fn reset(&mut self) {
        self.last_hash = None;
        self.last_histogram = None;
    }
}
