//! 感知哈希 - 灰度图降采样到 32x32 后做二维 DCT-II，
//! 取左上 8x8 低频系数按中位数二值化成 64 位指纹。
//! DC 分量不参与，避免整体亮度主导比较。

use rustdct::DctPlanner;

const SIDE: usize = 32;
const BLOCK: usize = 8;

/// 计算灰度图的 DCT 感知哈希
pub fn dct_phash(gray: &[u8], width: u32, height: u32) -> u64 {
    let mut small = downsample(gray, width as usize, height as usize);

    let mut planner = DctPlanner::new();
    let dct = planner.plan_dct2(SIDE);

    // 行变换
    for row in small.chunks_exact_mut(SIDE) {
        dct.process_dct2(row);
    }
    // 转置后再做一遍行变换，得到二维 DCT
    let mut transposed = vec![0f32; SIDE * SIDE];
    for y in 0..SIDE {
        for x in 0..SIDE {
            transposed[x * SIDE + y] = small[y * SIDE + x];
        }
    }
    for row in transposed.chunks_exact_mut(SIDE) {
        dct.process_dct2(row);
    }

    // 左上 8x8 低频块，剔除 DC 后取中位数
    let mut coeffs = Vec::with_capacity(BLOCK * BLOCK - 1);
    for u in 0..BLOCK {
        for v in 0..BLOCK {
            if u == 0 && v == 0 {
                continue;
            }
            coeffs.push(transposed[u * SIDE + v]);
        }
    }
    let mut sorted = coeffs.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[sorted.len() / 2];

    let mut hash = 0u64;
    for (i, &c) in coeffs.iter().enumerate() {
        if c > median {
            hash |= 1 << (i + 1);
        }
    }
    hash
}

pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

/// 分块均值降采样到 32x32
fn downsample(gray: &[u8], w: usize, h: usize) -> Vec<f32> {
    let mut out = vec![0f32; SIDE * SIDE];
    if w == 0 || h == 0 {
        return out;
    }
    let block_w = (w / SIDE).max(1);
    let block_h = (h / SIDE).max(1);

    for by in 0..SIDE {
        for bx in 0..SIDE {
            let y_start = (by * block_h).min(h.saturating_sub(1));
            let y_end = ((by + 1) * block_h).min(h);
            let x_start = (bx * block_w).min(w.saturating_sub(1));
            let x_end = ((bx + 1) * block_w).min(w);

            let mut sum = 0u32;
            let mut count = 0u32;
            for y in y_start..y_end {
                let row = y * w;
                for x in x_start..x_end {
                    if let Some(&p) = gray.get(row + x) {
                        sum += p as u32;
                        count += 1;
                    }
                }
            }
            out[by * SIDE + bx] = if count > 0 {
                sum as f32 / count as f32
            } else {
                0.0
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(w: usize, h: usize) -> Vec<u8> {
        (0..w * h).map(|i| ((i % w) * 255 / w) as u8).collect()
    }

    fn checker_frame(w: usize, h: usize) -> Vec<u8> {
        (0..w * h)
            .map(|i| {
                let x = i % w;
                let y = i / w;
                if (x / 8 + y / 8) % 2 == 0 {
                    230
                } else {
                    20
                }
            })
            .collect()
    }

    #[test]
    fn test_phash_deterministic() {
        let frame = gradient_frame(128, 128);
        let a = dct_phash(&frame, 128, 128);
        let b = dct_phash(&frame, 128, 128);
        assert_eq!(a, b);
    }

    #[test]
    fn test_phash_distinguishes_content() {
        let a = dct_phash(&gradient_frame(128, 128), 128, 128);
        let b = dct_phash(&checker_frame(128, 128), 128, 128);
        assert!(hamming_distance(a, b) > 8, "差异图案应有明显汉明距离");
    }

    #[test]
    fn test_phash_brightness_shift_small_distance() {
        let base = gradient_frame(128, 128);
        let brighter: Vec<u8> = base.iter().map(|&p| p.saturating_add(20)).collect();
        let a = dct_phash(&base, 128, 128);
        let b = dct_phash(&brighter, 128, 128);
        assert!(hamming_distance(a, b) <= 8, "整体提亮不应大幅改变指纹");
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(0b0, 0b0), 0);
        assert_eq!(hamming_distance(0b1111, 0b0000), 4);
    }
}
