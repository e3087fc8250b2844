//! 门面模块
//! Facade module
//!
//! 定义 UI 所依赖的 Sidekiq 数据访问能力接口；键布局见 [`keys`]
//! Defines the Sidekiq data-access capability interface the UI depends on; key layout in [`keys`]

use crate::error::Result;
use crate::job::{BusyData, DailyStat, MetricsJobTotals, PositionedEntry, QueueInfo, SortedEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

pub mod keys;

pub use keys::SortedSetKind;

/// 一个指标统计周期；核心将列表视为不透明
/// One metrics period; the core treats the list as opaque
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsPeriod {
  /// 展示标签，如 `1h`
  /// Display label such as `1h`
  pub label: &'static str,
  /// 周期覆盖的分钟数
  /// Minutes the period covers
  pub minutes: i64,
  /// 采样分钟键的步长
  /// Sampling step across minute keys
  pub step_minutes: i64,
}

impl fmt::Display for MetricsPeriod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.label)
  }
}

/// 指标面板的一行：一个任务类在周期内的累计
/// One metrics panel row: per-class totals over the period
#[derive(Debug, Clone)]
pub struct MetricsJobRow {
  pub class: String,
  pub totals: MetricsJobTotals,
}

/// 单个任务类的指标详情：累计、直方图原始桶和覆盖区间
/// Metrics detail for a single class: totals, raw histogram buckets, and the covered range
#[derive(Debug, Clone)]
pub struct MetricsJobDetail {
  pub class: String,
  pub period: MetricsPeriod,
  pub totals: MetricsJobTotals,
  /// ISO 分钟时间戳 → 每桶计数
  /// ISO minute timestamp → counts per bucket
  pub histogram: HashMap<String, Vec<u64>>,
  pub range: (DateTime<Utc>, DateTime<Utc>),
}

/// Redis 服务器信息摘要
/// Redis server info summary
#[derive(Debug, Clone, Default)]
pub struct RedisInfo {
  pub version: String,
  pub uptime_in_days: i64,
  pub connected_clients: i64,
  pub used_memory_human: String,
  pub used_memory_peak_human: String,
  pub total_keys: i64,
}

/// 门面特性：UI 依赖的稳定能力集合
/// Facade trait: the stable capability set views depend on
///
/// 门面负责键命名、管道批处理和信封解码；核心从不构造键
/// The facade owns key naming, pipeline batching, and envelope decoding; the core never builds keys
#[async_trait]
pub trait Facade: Send + Sync {
  // === 队列 ===
  // === Queues ===

  /// 获取所有队列及其长度、延迟
  /// Get all queues with size and latency
  async fn get_queues(&self) -> Result<Vec<QueueInfo>>;

  /// 队列当前长度
  /// Current queue size
  async fn queue_size(&self, name: &str) -> Result<i64>;

  /// 队列延迟：最老条目入队至今的秒数
  /// Queue latency: seconds since the oldest entry was enqueued
  async fn queue_latency(&self, name: &str) -> Result<f64>;

  /// 按范围读取队列任务，附带总数
  /// Ranged read of queue jobs, with the total
  async fn get_queue_jobs(
    &self,
    name: &str,
    start: i64,
    size: i64,
  ) -> Result<(Vec<PositionedEntry>, i64)>;

  /// 清空队列
  /// Clear a queue
  async fn clear_queue(&self, name: &str) -> Result<()>;

  // === 有序集合（重试 / 计划 / 死亡）===
  // === Sorted sets (retry / scheduled / dead) ===

  /// 按范围读取集合条目（按 score 升序），附带总数
  /// Ranged read of set entries (ascending score), with the total
  ///
  /// `size = -1` 表示读到集合末尾
  /// `size = -1` means "to the end of the set"
  async fn get_set_jobs(
    &self,
    kind: SortedSetKind,
    start: i64,
    size: i64,
  ) -> Result<(Vec<SortedEntry>, i64)>;

  /// 全量扫描并对解码字段做大小写不敏感的子串匹配
  /// Full scan with case-insensitive substring matching over decoded fields
  async fn scan_set_jobs(&self, kind: SortedSetKind, query: &str) -> Result<Vec<SortedEntry>>;

  /// 集合的最小/最大 score 条目
  /// Min/max score entries of the set
  async fn set_bounds(
    &self,
    kind: SortedSetKind,
  ) -> Result<(Option<SortedEntry>, Option<SortedEntry>)>;

  /// 删除单个条目；条目已不存在视为成功
  /// Delete a single entry; an already-gone entry counts as success
  async fn delete_set_job(&self, kind: SortedSetKind, score: f64, member: &str) -> Result<()>;

  /// 立即重试：从集合移除并推入其队列
  /// Retry now: remove from the set and push onto its queue
  async fn retry_job_now(&self, kind: SortedSetKind, score: f64, member: &str) -> Result<()>;

  /// 杀死重试条目：移入死亡集合
  /// Kill a retry entry: move it to the dead set
  async fn kill_retry_job(&self, score: f64, member: &str) -> Result<()>;

  /// 删除集合的全部条目
  /// Delete all entries of the set
  async fn delete_all(&self, kind: SortedSetKind) -> Result<()>;

  /// 将集合的全部条目推回各自队列
  /// Push all entries of the set back onto their queues
  async fn retry_all(&self, kind: SortedSetKind) -> Result<()>;

  // === 忙碌数据 ===
  // === Busy data ===

  /// 进程与执行中任务的快照；`process_filter` 对进程身份做子串过滤
  /// Snapshot of processes and in-flight jobs; `process_filter` substring-filters identities
  async fn get_busy_data(&self, process_filter: &str) -> Result<BusyData>;

  /// 请求进程静默（TSTP）
  /// Ask a process to quiet down (TSTP)
  async fn pause_process(&self, identity: &str) -> Result<()>;

  /// 请求进程停止（TERM）
  /// Ask a process to stop (TERM)
  async fn stop_process(&self, identity: &str) -> Result<()>;

  // === 指标 ===
  // === Metrics ===

  /// 可用统计周期，随 Sidekiq 版本变化
  /// Available periods, version-sensitive
  async fn metrics_period_order(&self) -> Result<Vec<MetricsPeriod>>;

  /// 周期内的任务类累计；`class_filter` 为大小写不敏感子串
  /// Per-class totals over the period; `class_filter` is a case-insensitive substring
  async fn get_metrics_top_jobs(
    &self,
    period: MetricsPeriod,
    class_filter: &str,
  ) -> Result<Vec<MetricsJobRow>>;

  /// 单个任务类的指标详情（直方图 + 累计 + 区间）
  /// Metrics detail for one class (histogram + totals + range)
  async fn get_metrics_job_detail(
    &self,
    class: &str,
    period: MetricsPeriod,
  ) -> Result<MetricsJobDetail>;

  /// 最近 N 天的处理/失败历史
  /// Processed/failed history for the last N days
  async fn get_stats_history(&self, days: i64) -> Result<Vec<DailyStat>>;

  /// Redis 服务器信息
  /// Redis server info
  async fn get_redis_info(&self) -> Result<RedisInfo>;
}
