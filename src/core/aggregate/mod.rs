//! 跨帧指标合并与冲突裁决
//!
//! 同一字段按规范值分组投票，完全确定性：
//! 1. 置信度之和最高的值胜出
//! 2. 平手比读数条数
//! 3. 再平手取贡献帧序号最大的值
//!
//! 第 3 条是显式策略而非实现巧合：默认观察窗口内计数器只增不减，
//! 越晚的截图越接近当前值。该假设尚未对照产品语义验证过。
//!
//! 胜出值上报的置信度取其分组内单条读数的最高置信度。
//! 一个字段在所有帧上都没有读数时记 unavailable，绝不补 0。

use std::collections::BTreeMap;

use log::debug;

use crate::models::{AggregatedMetrics, FieldValue, MetricField, MetricReading};

#[derive(Debug, Default)]
struct ValueGroup {
    weight: f64,
    count: u32,
    max_confidence: f32,
    last_frame: u32,
    frames: Vec<u32>,
}

/// 合并一个任务的全部读数；输入要求按帧序排列
pub fn aggregate(readings: &[MetricReading]) -> AggregatedMetrics {
    let mut per_field: BTreeMap<MetricField, BTreeMap<i64, ValueGroup>> = BTreeMap::new();

    for reading in readings {
        let group = per_field
            .entry(reading.field)
            .or_default()
            .entry(reading.value)
            .or_default();
        group.weight += reading.confidence as f64;
        group.count += 1;
        group.max_confidence = group.max_confidence.max(reading.confidence);
        group.last_frame = group.last_frame.max(reading.frame_index);
        group.frames.push(reading.frame_index);
    }

    let mut result = AggregatedMetrics::default();
    for field in MetricField::ALL {
        let Some(groups) = per_field.get(&field) else {
            result.unavailable.insert(field);
            continue;
        };

        // BTreeMap 迭代顺序固定，比较键完全有序，结果可复现
        let winner = groups.iter().max_by(|(_, a), (_, b)| {
            a.weight
                .total_cmp(&b.weight)
                .then(a.count.cmp(&b.count))
                .then(a.last_frame.cmp(&b.last_frame))
        });

        if let Some((&value, group)) = winner {
            let mut frames = group.frames.clone();
            frames.sort_unstable();
            frames.dedup();
            debug!(
                "字段 {} 胜出值 {}（权重 {:.2}，{} 条读数）",
                field, value, group.weight, group.count
            );
            result.values.insert(
                field,
                FieldValue {
                    value,
                    confidence: group.max_confidence,
                    frames,
                },
            );
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(frame_index: u32, field: MetricField, value: i64, confidence: f32) -> MetricReading {
        MetricReading {
            frame_index,
            field,
            raw: value.to_string(),
            value,
            confidence,
            locale: None,
        }
    }

    #[test]
    fn test_confidence_weighted_vote() {
        // 帧 3 和帧 7 报 1500（0.9 + 0.6 = 1.5），帧 5 报 1400（0.95）
        let readings = vec![
            reading(3, MetricField::Views, 1500, 0.9),
            reading(5, MetricField::Views, 1400, 0.95),
            reading(7, MetricField::Views, 1500, 0.6),
        ];
        let result = aggregate(&readings);
        let views = &result.values[&MetricField::Views];

        assert_eq!(views.value, 1500);
        assert!((views.confidence - 0.9).abs() < 1e-6);
        assert_eq!(views.frames, vec![3, 7]);
    }

    #[test]
    fn test_tie_broken_by_count() {
        let readings = vec![
            reading(1, MetricField::Likes, 100, 0.4),
            reading(2, MetricField::Likes, 100, 0.4),
            reading(3, MetricField::Likes, 200, 0.8),
        ];
        let result = aggregate(&readings);
        assert_eq!(result.values[&MetricField::Likes].value, 100);
    }

    #[test]
    fn test_final_tie_prefers_most_recent_frame() {
        let readings = vec![
            reading(2, MetricField::Shares, 10, 0.7),
            reading(9, MetricField::Shares, 12, 0.7),
        ];
        let result = aggregate(&readings);
        assert_eq!(result.values[&MetricField::Shares].value, 12);
    }

    #[test]
    fn test_missing_field_marked_unavailable_not_zero() {
        let readings = vec![reading(0, MetricField::Views, 5, 0.9)];
        let result = aggregate(&readings);

        assert!(result.unavailable.contains(&MetricField::Likes));
        assert!(!result.values.contains_key(&MetricField::Likes));
        assert_eq!(result.unavailable.len(), MetricField::ALL.len() - 1);
    }

    #[test]
    fn test_aggregation_deterministic() {
        let readings: Vec<MetricReading> = (0..20)
            .map(|i| {
                reading(
                    i,
                    MetricField::Views,
                    1000 + (i as i64 % 3) * 10,
                    0.5 + (i as f32) * 0.01,
                )
            })
            .collect();
        let a = aggregate(&readings);
        let b = aggregate(&readings);

        assert_eq!(
            a.values[&MetricField::Views],
            b.values[&MetricField::Views]
        );
        assert_eq!(a.unavailable, b.unavailable);
    }

    #[test]
    fn test_no_readings_everything_unavailable() {
        let result = aggregate(&[]);
        assert!(result.values.is_empty());
        assert_eq!(result.unavailable.len(), MetricField::ALL.len());
    }
}
