//! Sidekiq 门面的 Redis 实现
//! Redis implementation of the Sidekiq facade
//!
//! 读操作成组进入管道以减少往返；信封每次抓取只解码一次
//! Reads are grouped into pipelines to minimize round trips; envelopes are decoded once per fetch

use crate::base::{keys, Facade, MetricsJobDetail, MetricsJobRow, MetricsPeriod, RedisInfo};
use crate::base::keys::SortedSetKind;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::job::{
  BusyData, DailyStat, JobEnvelope, PositionedEntry, Process, QueueInfo, SortedEntry, WorkerJob,
};
use crate::redis::{DashConnection, RedisConfig};
use crate::tracker::DevTracker;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use redis::{AsyncCommands, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod metrics;

/// 开发追踪器环的容量
/// Dev tracker ring capacity
const TRACKER_CAPACITY: usize = 512;

/// 死亡集合保留的最大条目数（与 Sidekiq 的默认一致）
/// Maximum dead-set entries retained (matches Sidekiq's default)
const DEAD_MAX_JOBS: i64 = 10_000;

/// 死亡条目的保留期
/// Retention window for dead entries
const DEAD_TIMEOUT_DAYS: i64 = 180;

/// Sidekiq 门面的 Redis 客户端
/// Redis client behind the Sidekiq facade
///
/// 连接在所有视图间共享；管道组织是门面的职责
/// The connection is shared across views; pipelining is the facade's responsibility
#[derive(Clone)]
pub struct SidekiqClient {
  conn: DashConnection,
  tracker: Option<Arc<DevTracker>>,
  scan_chunk_size: usize,
}

impl SidekiqClient {
  /// 按配置建立连接；启用指标追踪时挂上追踪器
  /// Connect per the configuration; attach the tracker when metrics tracking is enabled
  pub async fn connect(config: &Config) -> Result<Self> {
    config.validate()?;
    let redis = RedisConfig::from_url(config.redis_url.as_str())?;
    let conn = redis.connect().await?;
    let tracker = config
      .metrics_tracking_enabled
      .then(|| Arc::new(DevTracker::new(TRACKER_CAPACITY)));
    Ok(Self {
      conn: DashConnection::new(conn, tracker.clone()),
      tracker,
      scan_chunk_size: config.scan_chunk_size,
    })
  }

  /// 诊断面板读取的追踪器
  /// The tracker the diagnostics panel reads
  pub fn tracker(&self) -> Option<Arc<DevTracker>> {
    self.tracker.clone()
  }

  fn conn(&self) -> DashConnection {
    self.conn.clone()
  }

  /// 按脚本回放应答的客户端，测试专用
  /// Client replaying scripted replies, tests only
  #[cfg(test)]
  fn scripted(conn: crate::redis::ScriptedConnection) -> Self {
    Self {
      conn: DashConnection::Scripted(conn),
      tracker: None,
      scan_chunk_size: 1000,
    }
  }

  /// 解码 WITHSCORES 结果；解码失败的成员跳过，不影响整次抓取
  /// Decode WITHSCORES results; undecodable members are skipped without failing the fetch
  fn decode_sorted_entries(members: Vec<(String, f64)>) -> Vec<SortedEntry> {
    members
      .into_iter()
      .filter_map(|(raw, score)| match JobEnvelope::decode(&raw) {
        Ok(envelope) => Some(SortedEntry::new(score, envelope)),
        Err(err) => {
          tracing::warn!(error = %err, "skipping undecodable sorted-set member");
          None
        }
      })
      .collect()
  }

  /// 把分页参数换算成 ZRANGE/LRANGE 的 stop 下标
  /// Convert the size parameter into a ZRANGE/LRANGE stop index
  ///
  /// `size = -1` 表示读到末尾
  /// `size = -1` means "to the end"
  fn stop_index(start: i64, size: i64) -> Result<i64> {
    if start < 0 {
      return Err(Error::invariant(format!("negative start: {start}")));
    }
    if size == -1 {
      Ok(-1)
    } else if size >= 0 {
      Ok(start + size - 1)
    } else {
      Err(Error::invariant(format!("negative size: {size}")))
    }
  }

  async fn tail_latency(&self, name: &str) -> Result<f64> {
    let mut conn = self.conn();
    let tail: Vec<String> = conn.lrange(keys::queue_key(name), -1, -1).await?;
    Ok(latency_from_tail(&tail))
  }
}

/// 队尾元素的入队时间距现在的秒数；空队列为 0
/// Seconds since the tail element was enqueued; 0 for an empty queue
fn latency_from_tail(tail: &[String]) -> f64 {
  let Some(raw) = tail.first() else {
    return 0.0;
  };
  let Ok(envelope) = JobEnvelope::decode(raw) else {
    return 0.0;
  };
  match envelope.enqueued_at() {
    Some(at) => {
      let secs = (Utc::now() - at).num_milliseconds() as f64 / 1000.0;
      secs.max(0.0)
    }
    None => 0.0,
  }
}

fn from_value<T: redis::FromRedisValue>(value: &Value, what: &str) -> Result<T> {
  redis::from_redis_value(value)
    .map_err(|err| Error::invalid_response(format!("{what}: {err}")))
}

#[async_trait]
impl Facade for SidekiqClient {
  async fn get_queues(&self) -> Result<Vec<QueueInfo>> {
    let mut conn = self.conn();
    let mut names: Vec<String> = conn.smembers(keys::QUEUES).await?;
    names.sort();
    if names.is_empty() {
      return Ok(Vec::new());
    }

    // 每个队列两条命令：长度 + 队尾元素（用于延迟）
    // Two commands per queue: size + tail element (for latency)
    let mut pipe = redis::pipe();
    for name in &names {
      let key = keys::queue_key(name);
      pipe.cmd("LLEN").arg(&key);
      pipe.cmd("LRANGE").arg(&key).arg(-1).arg(-1);
    }
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != names.len() * 2 {
      return Err(Error::invalid_response(format!(
        "queue pipeline returned {} replies for {} queues",
        replies.len(),
        names.len()
      )));
    }

    let mut queues = Vec::with_capacity(names.len());
    for (name, chunk) in names.into_iter().zip(replies.chunks(2)) {
      let size: i64 = from_value(&chunk[0], "queue size")?;
      let tail: Vec<String> = from_value(&chunk[1], "queue tail")?;
      queues.push(QueueInfo {
        name,
        size,
        latency: latency_from_tail(&tail),
      });
    }
    Ok(queues)
  }

  async fn queue_size(&self, name: &str) -> Result<i64> {
    let mut conn = self.conn();
    Ok(conn.llen(keys::queue_key(name)).await?)
  }

  async fn queue_latency(&self, name: &str) -> Result<f64> {
    self.tail_latency(name).await
  }

  async fn get_queue_jobs(
    &self,
    name: &str,
    start: i64,
    size: i64,
  ) -> Result<(Vec<PositionedEntry>, i64)> {
    let stop = Self::stop_index(start, size)?;
    let key = keys::queue_key(name);
    let mut conn = self.conn();

    let mut pipe = redis::pipe();
    pipe.cmd("LRANGE").arg(&key).arg(start).arg(stop);
    pipe.cmd("LLEN").arg(&key);
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != 2 {
      return Err(Error::invalid_response("queue jobs pipeline shape"));
    }
    let members: Vec<String> = from_value(&replies[0], "queue jobs")?;
    let total: i64 = from_value(&replies[1], "queue total")?;
    if total < 0 {
      return Err(Error::invariant(format!("negative queue total: {total}")));
    }

    let entries = members
      .into_iter()
      .enumerate()
      .filter_map(|(idx, raw)| match JobEnvelope::decode(&raw) {
        Ok(envelope) => Some(PositionedEntry::new(start as usize + idx, envelope)),
        Err(err) => {
          tracing::warn!(error = %err, queue = name, "skipping undecodable queue member");
          None
        }
      })
      .collect();
    Ok((entries, total))
  }

  async fn clear_queue(&self, name: &str) -> Result<()> {
    let mut conn = self.conn();
    let mut pipe = redis::pipe();
    pipe.cmd("DEL").arg(keys::queue_key(name)).ignore();
    pipe.cmd("SREM").arg(keys::QUEUES).arg(name).ignore();
    let _: () = pipe.query_async(&mut conn).await?;
    Ok(())
  }

  async fn get_set_jobs(
    &self,
    kind: SortedSetKind,
    start: i64,
    size: i64,
  ) -> Result<(Vec<SortedEntry>, i64)> {
    let stop = Self::stop_index(start, size)?;
    let key = kind.key();
    let mut conn = self.conn();

    // 范围读取与总数在一个管道内
    // Ranged read and total in one pipeline
    let mut pipe = redis::pipe();
    pipe
      .cmd("ZRANGE")
      .arg(key)
      .arg(start)
      .arg(stop)
      .arg("WITHSCORES");
    pipe.cmd("ZCARD").arg(key);
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != 2 {
      return Err(Error::invalid_response("set jobs pipeline shape"));
    }
    let members: Vec<(String, f64)> = from_value(&replies[0], "set jobs")?;
    let total: i64 = from_value(&replies[1], "set total")?;
    if total < 0 {
      return Err(Error::invariant(format!("negative set total: {total}")));
    }

    Ok((Self::decode_sorted_entries(members), total))
  }

  async fn scan_set_jobs(&self, kind: SortedSetKind, query: &str) -> Result<Vec<SortedEntry>> {
    let key = kind.key();
    let needle = query.to_lowercase();
    let chunk = self.scan_chunk_size as i64;
    let mut conn = self.conn();

    // 分块枚举整个集合，客户端做子串匹配；不设命中上限
    // Enumerate the whole set in chunks, matching client-side; no cap on hits
    let mut hits = Vec::new();
    let mut offset: i64 = 0;
    loop {
      let members: Vec<(String, f64)> = conn
        .zrange_withscores(key, offset as isize, (offset + chunk - 1) as isize)
        .await?;
      let fetched = members.len();
      for entry in Self::decode_sorted_entries(members) {
        if envelope_matches(&entry, &needle) {
          hits.push(entry);
        }
      }
      if (fetched as i64) < chunk {
        break;
      }
      offset += chunk;
    }
    Ok(hits)
  }

  async fn set_bounds(
    &self,
    kind: SortedSetKind,
  ) -> Result<(Option<SortedEntry>, Option<SortedEntry>)> {
    let key = kind.key();
    let mut conn = self.conn();
    let mut pipe = redis::pipe();
    pipe.cmd("ZRANGE").arg(key).arg(0).arg(0).arg("WITHSCORES");
    pipe.cmd("ZRANGE").arg(key).arg(-1).arg(-1).arg("WITHSCORES");
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != 2 {
      return Err(Error::invalid_response("bounds pipeline shape"));
    }
    let first: Vec<(String, f64)> = from_value(&replies[0], "set first")?;
    let last: Vec<(String, f64)> = from_value(&replies[1], "set last")?;
    Ok((
      Self::decode_sorted_entries(first).into_iter().next(),
      Self::decode_sorted_entries(last).into_iter().next(),
    ))
  }

  async fn delete_set_job(&self, kind: SortedSetKind, _score: f64, member: &str) -> Result<()> {
    let mut conn = self.conn();
    // 条目已被别处移除时操作者的意图已经满足，按成功处理
    // An entry already removed elsewhere means the operator's intent is satisfied; success
    let _removed: i64 = conn.zrem(kind.key(), member).await?;
    Ok(())
  }

  async fn retry_job_now(&self, kind: SortedSetKind, _score: f64, member: &str) -> Result<()> {
    let envelope = JobEnvelope::decode(member)?;
    let queue = envelope.queue();
    if queue.is_empty() {
      return Err(Error::malformed_envelope("entry has no queue"));
    }

    let mut conn = self.conn();
    // 只有真正从集合移除的条目才入队，避免重复执行；已消失的条目按成功处理
    // Only an entry actually removed from the set is enqueued, to avoid double execution;
    // an already-gone entry counts as success
    let removed: i64 = conn.zrem(kind.key(), member).await?;
    if removed == 0 {
      return Ok(());
    }
    let mut pipe = redis::pipe();
    pipe.cmd("SADD").arg(keys::QUEUES).arg(queue).ignore();
    pipe.cmd("LPUSH").arg(keys::queue_key(queue)).arg(member).ignore();
    let _: () = pipe.query_async(&mut conn).await?;
    Ok(())
  }

  async fn kill_retry_job(&self, _score: f64, member: &str) -> Result<()> {
    let mut conn = self.conn();
    // 已消失的条目按成功处理，且不写入死亡集合
    // An already-gone entry counts as success and is not added to the dead set
    let removed: i64 = conn.zrem(keys::RETRY, member).await?;
    if removed == 0 {
      return Ok(());
    }

    // 与 Sidekiq 一致：写入死亡集合时同时做年龄和数量裁剪
    // As Sidekiq does: trim the dead set by age and size while adding to it
    let now = Utc::now();
    let cutoff = now - ChronoDuration::days(DEAD_TIMEOUT_DAYS);
    let mut pipe = redis::pipe();
    pipe
      .cmd("ZADD")
      .arg(keys::DEAD)
      .arg(now.timestamp() as f64)
      .arg(member)
      .ignore();
    pipe
      .cmd("ZREMRANGEBYSCORE")
      .arg(keys::DEAD)
      .arg("-inf")
      .arg(cutoff.timestamp() as f64)
      .ignore();
    pipe
      .cmd("ZREMRANGEBYRANK")
      .arg(keys::DEAD)
      .arg(0)
      .arg(-(DEAD_MAX_JOBS + 1))
      .ignore();
    let _: () = pipe.query_async(&mut conn).await?;
    Ok(())
  }

  async fn delete_all(&self, kind: SortedSetKind) -> Result<()> {
    let mut conn = self.conn();
    let _: () = conn.del(kind.key()).await?;
    Ok(())
  }

  async fn retry_all(&self, kind: SortedSetKind) -> Result<()> {
    let key = kind.key();
    let chunk = self.scan_chunk_size as i64;
    let mut conn = self.conn();

    // 逐条移除后入队；读始终从 0 开始，因为集合在缩小
    // Remove then enqueue one by one; reads restart at 0 because the set is shrinking
    loop {
      let members: Vec<String> = conn.zrange(key, 0, (chunk - 1) as isize).await?;
      if members.is_empty() {
        return Ok(());
      }
      for member in members {
        let removed: i64 = conn.zrem(key, &member).await?;
        if removed == 0 {
          continue;
        }
        match JobEnvelope::decode(&member) {
          Ok(envelope) if !envelope.queue().is_empty() => {
            let queue = envelope.queue().to_string();
            let mut pipe = redis::pipe();
            pipe.cmd("SADD").arg(keys::QUEUES).arg(&queue).ignore();
            pipe
              .cmd("LPUSH")
              .arg(keys::queue_key(&queue))
              .arg(&member)
              .ignore();
            let _: () = pipe.query_async(&mut conn).await?;
          }
          _ => {
            tracing::warn!(set = %kind, "dropping undecodable member during retry-all");
          }
        }
      }
    }
  }

  async fn get_busy_data(&self, process_filter: &str) -> Result<BusyData> {
    let mut conn = self.conn();
    let mut identities: Vec<String> = conn.smembers(keys::PROCESSES).await?;
    identities.sort();
    if identities.is_empty() {
      return Ok(BusyData::default());
    }

    // 每个进程两条命令：信息哈希 + 工作哈希
    // Two commands per process: info hash + work hash
    let mut pipe = redis::pipe();
    for identity in &identities {
      pipe.cmd("HGETALL").arg(keys::process_key(identity));
      pipe.cmd("HGETALL").arg(keys::work_key(identity));
    }
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != identities.len() * 2 {
      return Err(Error::invalid_response("busy pipeline shape"));
    }

    let needle = process_filter.to_lowercase();
    let mut busy = BusyData::default();
    for (identity, chunk) in identities.iter().zip(replies.chunks(2)) {
      let info: HashMap<String, String> = from_value(&chunk[0], "process info")?;
      if info.is_empty() {
        // 进程集合里的身份可能已过期，哈希被 TTL 清掉
        // An identity in the set may be stale, its hash expired by TTL
        continue;
      }
      let process = match Process::from_hash(identity, &info) {
        Ok(process) => process,
        Err(err) => {
          tracing::warn!(error = %err, identity, "skipping undecodable process");
          continue;
        }
      };
      if !needle.is_empty() && !process_matches(&process, &needle) {
        continue;
      }
      let work: HashMap<String, String> = from_value(&chunk[1], "process work")?;
      for (tid, json) in &work {
        match WorkerJob::from_hash_entry(identity, tid, json) {
          Ok(job) => busy.jobs.push(job),
          Err(err) => {
            tracing::warn!(error = %err, identity, tid, "skipping undecodable worker job");
          }
        }
      }
      busy.processes.push(process);
    }
    // 执行中任务按开始时间排序，老的在前
    // In-flight jobs ordered oldest first
    busy
      .jobs
      .sort_by(|a, b| a.run_at.cmp(&b.run_at).then_with(|| a.tid.cmp(&b.tid)));
    Ok(busy)
  }

  async fn pause_process(&self, identity: &str) -> Result<()> {
    let mut conn = self.conn();
    let _: () = conn.lpush(keys::signal_key(identity), "TSTP").await?;
    Ok(())
  }

  async fn stop_process(&self, identity: &str) -> Result<()> {
    let mut conn = self.conn();
    let _: () = conn.lpush(keys::signal_key(identity), "TERM").await?;
    Ok(())
  }

  async fn metrics_period_order(&self) -> Result<Vec<MetricsPeriod>> {
    self.period_order().await
  }

  async fn get_metrics_top_jobs(
    &self,
    period: MetricsPeriod,
    class_filter: &str,
  ) -> Result<Vec<MetricsJobRow>> {
    self.top_jobs(period, class_filter).await
  }

  async fn get_metrics_job_detail(
    &self,
    class: &str,
    period: MetricsPeriod,
  ) -> Result<MetricsJobDetail> {
    self.job_detail(class, period).await
  }

  async fn get_stats_history(&self, days: i64) -> Result<Vec<DailyStat>> {
    self.stats_history(days).await
  }

  async fn get_redis_info(&self) -> Result<RedisInfo> {
    self.redis_info().await
  }
}

/// 条目是否命中查询：对类名、JID、队列、错误类、错误消息做子串匹配
/// Whether an entry matches the query: substring over class, JID, queue, error class, error message
fn envelope_matches(entry: &SortedEntry, needle: &str) -> bool {
  if needle.is_empty() {
    return true;
  }
  let envelope = &entry.envelope;
  [
    envelope.display_class(),
    envelope.class(),
    envelope.jid(),
    envelope.queue(),
    envelope.error_class(),
    envelope.error_message(),
  ]
  .iter()
  .any(|field| field.to_lowercase().contains(needle))
}

fn process_matches(process: &Process, needle: &str) -> bool {
  [
    process.identity.as_str(),
    process.hostname.as_str(),
    process.tag.as_str(),
  ]
  .iter()
  .any(|field| field.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn entry(class: &str, queue: &str, error_message: &str) -> SortedEntry {
    let raw = json!({
      "class": class,
      "queue": queue,
      "jid": "abc123",
      "error_class": "RuntimeError",
      "error_message": error_message,
    })
    .to_string();
    SortedEntry::new(1.0, JobEnvelope::decode(&raw).unwrap())
  }

  #[test]
  fn test_stop_index() {
    assert_eq!(SidekiqClient::stop_index(0, 30).unwrap(), 29);
    assert_eq!(SidekiqClient::stop_index(10, 5).unwrap(), 14);
    // -1 表示读到末尾
    // -1 means "to the end"
    assert_eq!(SidekiqClient::stop_index(0, -1).unwrap(), -1);
    assert!(SidekiqClient::stop_index(-1, 10).is_err());
    assert!(SidekiqClient::stop_index(0, -2).is_err());
  }

  #[tokio::test]
  async fn test_delete_gone_entry_counts_as_success() {
    // ZREM 返回 0：条目已被别处移除，操作者的意图已满足
    // ZREM replies 0: the entry was removed elsewhere, the operator's intent is satisfied
    let conn = crate::redis::ScriptedConnection::new(vec![redis::Value::Int(0)]);
    let client = SidekiqClient::scripted(conn.clone());
    let member = entry("HardJob", "default", "boom");
    client
      .delete_set_job(SortedSetKind::Retry, member.score, member.envelope.raw())
      .await
      .unwrap();
    assert_eq!(conn.issued(), 1);
  }

  #[tokio::test]
  async fn test_retry_now_gone_entry_skips_enqueue() {
    let conn = crate::redis::ScriptedConnection::new(vec![redis::Value::Int(0)]);
    let client = SidekiqClient::scripted(conn.clone());
    let member = entry("HardJob", "default", "boom");
    client
      .retry_job_now(SortedSetKind::Scheduled, member.score, member.envelope.raw())
      .await
      .unwrap();
    // ZREM 之后不得再有入队往返
    // No enqueue round trip may follow the ZREM
    assert_eq!(conn.issued(), 1);
  }

  #[tokio::test]
  async fn test_kill_gone_entry_skips_dead_add() {
    let conn = crate::redis::ScriptedConnection::new(vec![redis::Value::Int(0)]);
    let client = SidekiqClient::scripted(conn.clone());
    let member = entry("HardJob", "default", "boom");
    client
      .kill_retry_job(member.score, member.envelope.raw())
      .await
      .unwrap();
    assert_eq!(conn.issued(), 1);
  }

  #[test]
  fn test_envelope_matches() {
    let e = entry("HardJob", "default", "connection timed out");
    assert!(envelope_matches(&e, "hardjob"));
    assert!(!envelope_matches(&e, "timeout"));
    assert!(envelope_matches(&e, "timed out"));
    assert!(envelope_matches(&e, "abc"));
    assert!(envelope_matches(&e, "runtime"));
    assert!(!envelope_matches(&e, "mailers"));
    assert!(envelope_matches(&e, ""));
  }

  #[test]
  fn test_decode_sorted_entries_skips_bad_members() {
    let members = vec![
      (entry("HardJob", "default", "boom").envelope.raw().to_string(), 5.0),
      ("not json".to_string(), 6.0),
      (json!({"class": "NoJid"}).to_string(), 7.0),
    ];
    let entries = SidekiqClient::decode_sorted_entries(members);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].score, 5.0);
  }

  #[test]
  fn test_latency_from_tail() {
    assert_eq!(latency_from_tail(&[]), 0.0);
    assert_eq!(latency_from_tail(&["garbage".to_string()]), 0.0);

    let past = (Utc::now() - ChronoDuration::seconds(90)).timestamp() as f64;
    let raw = json!({"class": "HardJob", "jid": "x1", "queue": "default", "enqueued_at": past})
      .to_string();
    let latency = latency_from_tail(&[raw]);
    assert!(latency >= 89.0 && latency <= 92.0, "latency was {latency}");
  }
}
