//! 任务记录模块
//! Job record module
//!
//! 围绕已解码 Sidekiq 任务信封的不可变包装，以及进程与指标快照类型
//! Immutable wrappers around decoded Sidekiq job envelopes, plus process and metrics snapshot types

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// ActiveJob 适配器的包装类名
/// Wrapper class name used by the ActiveJob adapter
const ACTIVE_JOB_WRAPPER: &str = "ActiveJob::QueueAdapters::SidekiqAdapter::JobWrapper";

/// 已解码的任务信封
/// A decoded job envelope
///
/// 从 Redis 成员解码后创建，之后不可变；各视图通过引用共享
/// Created on decode from a Redis member, immutable thereafter; shared by reference across views
#[derive(Debug, Clone)]
pub struct JobEnvelope {
  raw: String,
  fields: Map<String, Value>,
}

impl JobEnvelope {
  /// 从原始 JSON 成员解码信封
  /// Decode an envelope from a raw JSON member
  ///
  /// 出现在 UI 中的任何条目都必须有非空 JID
  /// Any entry surfaced to the UI must carry a non-empty JID
  pub fn decode(raw: &str) -> Result<Self> {
    let value: Value = serde_json::from_str(raw)?;
    let fields = match value {
      Value::Object(map) => map,
      _ => return Err(Error::malformed_envelope("envelope is not a JSON object")),
    };
    let envelope = Self {
      raw: raw.to_string(),
      fields,
    };
    if envelope.jid().is_empty() {
      return Err(Error::malformed_envelope("envelope has no jid"));
    }
    Ok(envelope)
  }

  fn str_field(&self, name: &str) -> Option<&str> {
    self.fields.get(name).and_then(Value::as_str)
  }

  fn f64_field(&self, name: &str) -> Option<f64> {
    self.fields.get(name).and_then(Value::as_f64)
  }

  /// 原始 JSON 文本
  /// Raw JSON text
  pub fn raw(&self) -> &str {
    &self.raw
  }

  /// 任务 ID
  /// Job ID
  pub fn jid(&self) -> &str {
    self.str_field("jid").unwrap_or_default()
  }

  /// 批次 ID（如有）
  /// Batch ID, when present
  pub fn bid(&self) -> Option<&str> {
    self.str_field("bid")
  }

  /// 入队的类名
  /// Enqueued class name
  pub fn class(&self) -> &str {
    self.str_field("class").unwrap_or_default()
  }

  /// 展示用类名：解开 ActiveJob 包装后的真实类
  /// Display class name: the real class once ActiveJob wrapping is unwrapped
  pub fn display_class(&self) -> &str {
    if let Some(wrapped) = self.str_field("wrapped") {
      return wrapped;
    }
    if self.class() == ACTIVE_JOB_WRAPPER {
      if let Some(job_class) = self
        .fields
        .get("args")
        .and_then(Value::as_array)
        .and_then(|args| args.first())
        .and_then(|arg| arg.get("job_class"))
        .and_then(Value::as_str)
      {
        return job_class;
      }
    }
    self.class()
  }

  /// 队列名
  /// Queue name
  pub fn queue(&self) -> &str {
    self.str_field("queue").unwrap_or_default()
  }

  /// 原始参数
  /// Raw arguments
  pub fn args(&self) -> &[Value] {
    self
      .fields
      .get("args")
      .and_then(Value::as_array)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// 展示用参数：对 ActiveJob 包装解出内部 arguments
  /// Display arguments: the inner arguments for ActiveJob-wrapped jobs
  pub fn display_args(&self) -> Vec<Value> {
    if self.str_field("wrapped").is_some() || self.class() == ACTIVE_JOB_WRAPPER {
      if let Some(arguments) = self
        .args()
        .first()
        .and_then(|arg| arg.get("arguments"))
        .and_then(Value::as_array)
      {
        return arguments.clone();
      }
    }
    self.args().to_vec()
  }

  /// 标签
  /// Tags
  pub fn tags(&self) -> Vec<String> {
    self
      .fields
      .get("tags")
      .and_then(Value::as_array)
      .map(|tags| {
        tags
          .iter()
          .filter_map(Value::as_str)
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }

  /// 创建时间
  /// Created-at time
  pub fn created_at(&self) -> Option<DateTime<Utc>> {
    self.f64_field("created_at").and_then(epoch_to_datetime)
  }

  /// 入队时间
  /// Enqueued-at time
  pub fn enqueued_at(&self) -> Option<DateTime<Utc>> {
    self.f64_field("enqueued_at").and_then(epoch_to_datetime)
  }

  /// 已重试次数
  /// Retry count so far
  pub fn retry_count(&self) -> i64 {
    self
      .fields
      .get("retry_count")
      .and_then(Value::as_i64)
      .unwrap_or(0)
  }

  /// 首次失败时间
  /// First failure time
  pub fn failed_at(&self) -> Option<DateTime<Utc>> {
    self.f64_field("failed_at").and_then(epoch_to_datetime)
  }

  /// 最近一次重试时间
  /// Most recent retry time
  pub fn retried_at(&self) -> Option<DateTime<Utc>> {
    self.f64_field("retried_at").and_then(epoch_to_datetime)
  }

  /// 错误类名
  /// Error class name
  pub fn error_class(&self) -> &str {
    self.str_field("error_class").unwrap_or_default()
  }

  /// 错误消息
  /// Error message
  pub fn error_message(&self) -> &str {
    self.str_field("error_message").unwrap_or_default()
  }

  /// 错误回溯
  /// Error backtrace
  pub fn error_backtrace(&self) -> Vec<String> {
    self
      .fields
      .get("error_backtrace")
      .and_then(Value::as_array)
      .map(|lines| {
        lines
          .iter()
          .filter_map(Value::as_str)
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }
}

fn epoch_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
  if !secs.is_finite() || secs < 0.0 {
    return None;
  }
  let whole = secs.trunc() as i64;
  let nanos = ((secs - secs.trunc()) * 1e9) as u32;
  Utc.timestamp_opt(whole, nanos).single()
}

/// 有序集合条目：(score, 信封)
/// Sorted set entry: (score, envelope)
///
/// score 为 Unix 秒，定义集合内的时间顺序
/// The score is Unix seconds and defines time ordering within the set
#[derive(Debug, Clone)]
pub struct SortedEntry {
  /// 集合内的分数（下次重试 / 计划执行 / 死亡时间）
  /// Score in the set (next-retry / scheduled-at / died-at)
  pub score: f64,
  /// 信封，按引用共享
  /// The envelope, shared by reference
  pub envelope: Arc<JobEnvelope>,
}

impl SortedEntry {
  /// 创建条目
  /// Create an entry
  pub fn new(score: f64, envelope: JobEnvelope) -> Self {
    Self {
      score,
      envelope: Arc::new(envelope),
    }
  }

  /// 分数对应的时间
  /// The score as a point in time
  pub fn at(&self) -> Option<DateTime<Utc>> {
    epoch_to_datetime(self.score)
  }

  /// 变更操作所需的 (score, 原始成员) 元组
  /// The (score, raw-member) tuple targeted mutations need
  pub fn target(&self) -> (f64, &str) {
    (self.score, self.envelope.raw())
  }
}

/// 列表队列条目：(位置, 信封)
/// List queue entry: (position, envelope)
///
/// 位置仅对产生它的快照有效
/// The position is valid only against the snapshot that produced it
#[derive(Debug, Clone)]
pub struct PositionedEntry {
  /// 队列内的 0 基位置
  /// 0-based position within the queue
  pub position: usize,
  /// 信封
  /// The envelope
  pub envelope: Arc<JobEnvelope>,
}

impl PositionedEntry {
  /// 创建条目
  /// Create an entry
  pub fn new(position: usize, envelope: JobEnvelope) -> Self {
    Self {
      position,
      envelope: Arc::new(envelope),
    }
  }
}

/// 队列快照
/// Queue snapshot
#[derive(Debug, Clone)]
pub struct QueueInfo {
  /// Redis 可见的队列名
  /// The Redis-visible queue name
  pub name: String,
  /// 当前长度
  /// Current size
  pub size: i64,
  /// 延迟秒数：最老条目入队至今
  /// Latency in seconds: age of the oldest entry
  pub latency: f64,
}

/// 进程信息哈希中 `info` 字段的 JSON 结构
/// JSON shape of the `info` field in the process hash
#[derive(Debug, Clone, Deserialize)]
struct RawProcessInfo {
  #[serde(default)]
  hostname: String,
  #[serde(default)]
  started_at: f64,
  #[serde(default)]
  pid: i64,
  #[serde(default)]
  tag: String,
  #[serde(default)]
  concurrency: i64,
  #[serde(default)]
  queues: Vec<String>,
  #[serde(default)]
  weights: Value,
  #[serde(default)]
  identity: String,
  #[serde(default)]
  version: String,
}

/// 一个已注册的 Sidekiq 进程
/// A registered Sidekiq process
///
/// 身份 host:pid:nonce 是关联任务的规范键
/// The identity host:pid:nonce is the canonical key for correlating jobs
#[derive(Debug, Clone)]
pub struct Process {
  pub identity: String,
  pub hostname: String,
  pub pid: i64,
  pub tag: String,
  pub concurrency: i64,
  pub busy: i64,
  pub rss: i64,
  pub started_at: Option<DateTime<Utc>>,
  pub queues: Vec<String>,
  pub queue_weights: HashMap<String, i64>,
  /// `running` 或 `quiet`
  /// `running` or `quiet`
  pub status: String,
  pub version: String,
}

impl Process {
  /// 从进程哈希字段构建快照
  /// Build a snapshot from the process hash fields
  pub fn from_hash(identity: &str, hash: &HashMap<String, String>) -> Result<Self> {
    let info_json = hash
      .get("info")
      .ok_or_else(|| Error::malformed_envelope(format!("process {identity} has no info field")))?;
    let info: RawProcessInfo = serde_json::from_str(info_json)?;
    let busy = hash
      .get("busy")
      .and_then(|v| v.parse::<i64>().ok())
      .unwrap_or(0);
    let rss = hash
      .get("rss")
      .and_then(|v| v.parse::<i64>().ok())
      .unwrap_or(0);
    let quiet = hash.get("quiet").map(String::as_str) == Some("true");
    let identity = if info.identity.is_empty() {
      identity.to_string()
    } else {
      info.identity
    };
    Ok(Self {
      identity,
      hostname: info.hostname,
      pid: info.pid,
      tag: info.tag,
      concurrency: info.concurrency,
      busy,
      rss,
      started_at: epoch_to_datetime(info.started_at),
      queues: info.queues,
      queue_weights: parse_weights(&info.weights),
      status: if quiet { "quiet" } else { "running" }.to_string(),
      version: info.version,
    })
  }
}

fn parse_weights(value: &Value) -> HashMap<String, i64> {
  let mut weights = HashMap::new();
  match value {
    // 旧格式：[{"default": 5}, {"low": 1}]
    // Legacy shape: [{"default": 5}, {"low": 1}]
    Value::Array(entries) => {
      for entry in entries {
        if let Value::Object(map) = entry {
          for (queue, weight) in map {
            if let Some(w) = weight.as_i64() {
              weights.insert(queue.clone(), w);
            }
          }
        }
      }
    }
    Value::Object(map) => {
      for (queue, weight) in map {
        if let Some(w) = weight.as_i64() {
          weights.insert(queue.clone(), w);
        }
      }
    }
    _ => {}
  }
  weights
}

/// 工作哈希条目的 JSON 结构
/// JSON shape of a work hash entry
#[derive(Debug, Clone, Deserialize)]
struct RawWorkerJob {
  #[serde(default)]
  queue: String,
  #[serde(default)]
  payload: String,
  #[serde(default)]
  run_at: f64,
}

/// 某进程正在执行的一个任务
/// A job currently executing on a process
#[derive(Debug, Clone)]
pub struct WorkerJob {
  pub process_identity: String,
  /// 线程 ID（工作哈希的字段名）
  /// Thread ID (the work hash field name)
  pub tid: String,
  pub queue: String,
  pub run_at: Option<DateTime<Utc>>,
  pub envelope: Arc<JobEnvelope>,
}

impl WorkerJob {
  /// 从工作哈希的一个 (tid, json) 对构建
  /// Build from one (tid, json) pair of the work hash
  pub fn from_hash_entry(identity: &str, tid: &str, json: &str) -> Result<Self> {
    let raw: RawWorkerJob = serde_json::from_str(json)?;
    let envelope = JobEnvelope::decode(&raw.payload)?;
    Ok(Self {
      process_identity: identity.to_string(),
      tid: tid.to_string(),
      queue: raw.queue,
      run_at: epoch_to_datetime(raw.run_at),
      envelope: Arc::new(envelope),
    })
  }
}

/// 忙碌面板的数据快照
/// Data snapshot for the busy panel
#[derive(Debug, Clone, Default)]
pub struct BusyData {
  pub processes: Vec<Process>,
  pub jobs: Vec<WorkerJob>,
}

/// 某统计周期内一个任务类的累计
/// Per-class totals over one metrics period
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsJobTotals {
  pub processed: i64,
  pub failed: i64,
  /// 总执行秒数
  /// Total execution seconds
  pub seconds: f64,
}

impl MetricsJobTotals {
  /// 成功数 = max(处理数 − 失败数, 0)
  /// Success = max(processed − failed, 0)
  pub fn success(&self) -> i64 {
    (self.processed - self.failed).max(0)
  }

  /// 平均执行秒数
  /// Average execution seconds
  pub fn avg_seconds(&self) -> f64 {
    self.seconds / self.processed.max(1) as f64
  }
}

/// 一天的处理/失败统计
/// One day of processed/failed stats
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStat {
  pub date: chrono::NaiveDate,
  pub processed: i64,
  pub failed: i64,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn plain_envelope() -> String {
    json!({
      "class": "HardJob",
      "queue": "default",
      "args": [1, "two"],
      "jid": "abc123",
      "created_at": 1_700_000_000.25,
      "enqueued_at": 1_700_000_001.5,
      "retry_count": 2,
      "error_class": "RuntimeError",
      "error_message": "boom",
      "tags": ["billing"]
    })
    .to_string()
  }

  fn wrapped_envelope() -> String {
    json!({
      "class": ACTIVE_JOB_WRAPPER,
      "wrapped": "InvoiceJob",
      "queue": "mailers",
      "args": [{"job_class": "InvoiceJob", "arguments": [42, "resend"]}],
      "jid": "def456"
    })
    .to_string()
  }

  #[test]
  fn test_decode_plain_envelope() {
    let envelope = JobEnvelope::decode(&plain_envelope()).unwrap();
    assert_eq!(envelope.jid(), "abc123");
    assert_eq!(envelope.class(), "HardJob");
    assert_eq!(envelope.display_class(), "HardJob");
    assert_eq!(envelope.queue(), "default");
    assert_eq!(envelope.args().len(), 2);
    assert_eq!(envelope.retry_count(), 2);
    assert_eq!(envelope.error_class(), "RuntimeError");
    assert_eq!(envelope.error_message(), "boom");
    assert_eq!(envelope.tags(), vec!["billing".to_string()]);
    assert!(envelope.enqueued_at().is_some());
    assert!(envelope.failed_at().is_none());
  }

  #[test]
  fn test_display_class_unwraps_active_job() {
    let envelope = JobEnvelope::decode(&wrapped_envelope()).unwrap();
    assert_eq!(envelope.display_class(), "InvoiceJob");
    assert_eq!(envelope.display_args(), vec![json!(42), json!("resend")]);
  }

  #[test]
  fn test_decode_rejects_bad_envelopes() {
    assert!(JobEnvelope::decode("not json").is_err());
    assert!(JobEnvelope::decode("[1,2,3]").is_err());
    // 没有 jid 的信封不能进入 UI
    // An envelope without a jid never reaches the UI
    assert!(JobEnvelope::decode(r#"{"class":"HardJob"}"#).is_err());
  }

  #[test]
  fn test_sorted_entry_target() {
    let raw = plain_envelope();
    let entry = SortedEntry::new(1_700_000_100.0, JobEnvelope::decode(&raw).unwrap());
    let (score, member) = entry.target();
    assert_eq!(score, 1_700_000_100.0);
    assert_eq!(member, raw);
    assert!(entry.at().is_some());
  }

  #[test]
  fn test_process_from_hash() {
    let mut hash = HashMap::new();
    hash.insert(
      "info".to_string(),
      json!({
        "hostname": "worker-1",
        "started_at": 1_700_000_000.0,
        "pid": 77,
        "tag": "app",
        "concurrency": 10,
        "queues": ["default", "low"],
        "weights": [{"default": 5}, {"low": 1}],
        "identity": "worker-1:77:aaaa",
        "version": "7.2.0"
      })
      .to_string(),
    );
    hash.insert("busy".to_string(), "3".to_string());
    hash.insert("rss".to_string(), "102400".to_string());
    hash.insert("quiet".to_string(), "true".to_string());

    let process = Process::from_hash("worker-1:77:aaaa", &hash).unwrap();
    assert_eq!(process.identity, "worker-1:77:aaaa");
    assert_eq!(process.busy, 3);
    assert_eq!(process.status, "quiet");
    assert_eq!(process.queue_weights.get("default"), Some(&5));
    assert_eq!(process.version, "7.2.0");
  }

  #[test]
  fn test_metrics_totals() {
    let totals = MetricsJobTotals {
      processed: 10,
      failed: 3,
      seconds: 25.0,
    };
    assert_eq!(totals.success(), 7);
    assert_eq!(totals.avg_seconds(), 2.5);

    let weird = MetricsJobTotals {
      processed: 2,
      failed: 5,
      seconds: 1.0,
    };
    assert_eq!(weird.success(), 0);

    let empty = MetricsJobTotals::default();
    assert_eq!(empty.avg_seconds(), 0.0);
  }
}
