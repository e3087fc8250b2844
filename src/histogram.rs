//! 直方图预处理模块
//! Histogram pre-processing module
//!
//! 数据到达时计算一次，渲染路径只遍历可见行
//! Computed once on data arrival so render paths stay O(visible rows)

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 延迟桶数
/// Number of latency buckets
pub const BUCKET_COUNT: usize = 26;

/// 桶标签，下标 0 为最低延迟桶（与 Sidekiq 的区间一致）
/// Bucket labels, index 0 is the lowest-latency bucket (Sidekiq's intervals)
pub const BUCKET_LABELS: [&str; BUCKET_COUNT] = [
  "20ms", "30ms", "45ms", "65ms", "100ms", "150ms", "225ms", "335ms", "500ms", "750ms", "1.1s",
  "1.7s", "2.5s", "3.8s", "5.75s", "8.5s", "13s", "20s", "30s", "45s", "65s", "100s", "150s",
  "225s", "335s", "Inf",
];

/// 散点：时间列 × 翻转后的桶行 × 计数
/// Scatter point: time column × flipped bucket row × count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterPoint {
  /// 按时间排序后的列下标
  /// Column index after chronological sort
  pub x: usize,
  /// 展示行：0 为最高延迟桶
  /// Display row: 0 is the highest-latency bucket
  pub y: usize,
  pub count: u64,
}

/// 预处理结果
/// Pre-processed result
#[derive(Debug, Clone, Default)]
pub struct HistogramData {
  /// 按时间升序的分钟时间戳
  /// Minute timestamps in chronological order
  pub times: Vec<DateTime<Utc>>,
  /// 每桶总计，下标 0 对应最高延迟桶（展示序）
  /// Per-bucket totals, index 0 is the highest-latency bucket (display order)
  pub bucket_totals: Vec<u64>,
  /// 每个非零单元一个散点
  /// One point per non-zero cell
  pub points: Vec<ScatterPoint>,
  /// 最大单元计数
  /// Largest cell count
  pub max_count: u64,
  /// 出现过计数的最高展示行；无数据为 -1
  /// Highest display row with any count; -1 when there is no data
  pub max_bucket: i64,
}

impl HistogramData {
  /// 对 `{ISO 时间戳 → 每桶计数}` 做一趟预处理
  /// One pass over `{ISO timestamp → counts per bucket}`
  ///
  /// 无法解析的键静默丢弃
  /// Keys that fail to parse are dropped silently
  pub fn build(raw: &HashMap<String, Vec<u64>>) -> Self {
    let mut entries: Vec<(DateTime<Utc>, &Vec<u64>)> = raw
      .iter()
      .filter_map(|(key, counts)| {
        DateTime::parse_from_rfc3339(key)
          .ok()
          .map(|ts| (ts.with_timezone(&Utc), counts))
      })
      .collect();
    entries.sort_by_key(|(ts, _)| *ts);

    let mut data = HistogramData {
      bucket_totals: vec![0; BUCKET_COUNT],
      max_bucket: -1,
      ..Default::default()
    };
    for (time_idx, (ts, counts)) in entries.iter().enumerate() {
      data.times.push(*ts);
      for (bucket, &count) in counts.iter().take(BUCKET_COUNT).enumerate() {
        data.bucket_totals[bucket] += count;
        if count > 0 {
          let y = BUCKET_COUNT - 1 - bucket;
          data.points.push(ScatterPoint {
            x: time_idx,
            y,
            count,
          });
          data.max_count = data.max_count.max(count);
          data.max_bucket = data.max_bucket.max(y as i64);
        }
      }
    }
    // 翻转总计：下标 0 在展示时对应最高延迟桶
    // Reverse the totals: index 0 maps to the highest-latency bucket at display time
    data.bucket_totals.reverse();
    data
  }

  /// 是否没有任何计数
  /// Whether no cell has a count
  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }
}
