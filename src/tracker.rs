//! 开发追踪器模块
//! Dev tracker module
//!
//! 记录 Redis 命令的有界环形日志，供诊断面板使用；未启用时完全透明
//! A bounded ring log of Redis commands for the diagnostics panel; transparent when unused

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::RwLock;
use std::time::Duration;

tokio::task_local! {
  /// 传播中的来源标签
  /// The propagated origin label
  static ORIGIN: String;
}

/// 在给定来源标签下运行一个 future
/// Run a future under the given origin label
///
/// 标签沿任务传播；记录命令时显式标签总是获胜
/// The label propagates along the task; an explicit label always wins when recording
pub async fn with_origin<F>(label: impl Into<String>, fut: F) -> F::Output
where
  F: Future,
{
  ORIGIN.scope(label.into(), fut).await
}

/// 当前来源标签；缺失时为 `unknown`
/// The current origin label; `unknown` when absent
///
/// Rust 没有廉价的栈内省，因此没有栈探测回退：来源必须显式传播
/// Rust has no cheap stack introspection, so there is no stack-probe fallback: origins are explicit
pub fn current_origin() -> String {
  ORIGIN
    .try_with(|origin| origin.clone())
    .unwrap_or_else(|_| "unknown".to_string())
}

/// 日志条目类型
/// Log entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
  /// 单条命令
  /// A single command
  Command,
  /// 管道开始（附带命令清单）
  /// Pipeline begin (with the command list)
  PipelineBegin,
  /// 管道执行完成
  /// Pipeline execution finished
  PipelineExec,
  /// 命令或管道的结果摘要
  /// Result summary of a command or pipeline
  Result,
}

/// 一条追踪日志
/// One tracked log entry
#[derive(Debug, Clone)]
pub struct DevLogEntry {
  /// 严格递增的序号
  /// Strictly increasing sequence number
  pub seq: u64,
  pub time: DateTime<Utc>,
  pub origin: String,
  pub kind: LogKind,
  pub command: String,
  pub duration: Option<Duration>,
}

struct Ring {
  entries: Vec<DevLogEntry>,
  /// 满了之后下一个被覆盖的槽位
  /// Next slot to overwrite once full
  head: usize,
  full: bool,
  next_seq: u64,
}

/// 开发追踪器：固定容量的时间顺序环
/// Dev tracker: a fixed-capacity chronological ring
///
/// 单写多读；所有访问都经过读写锁
/// Single-writer/multi-reader; all access goes through a reader-writer lock
pub struct DevTracker {
  capacity: usize,
  ring: RwLock<Ring>,
}

impl DevTracker {
  /// 创建给定容量的追踪器
  /// Create a tracker with the given capacity
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      ring: RwLock::new(Ring {
        entries: Vec::new(),
        head: 0,
        full: false,
        next_seq: 0,
      }),
    }
  }

  /// 环的容量
  /// Ring capacity
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// 追加一条日志；满了之后就地覆盖最老的条目
  /// Append an entry; once full the oldest entry is overwritten in place
  pub fn append_log(&self, kind: LogKind, command: String, duration: Option<Duration>) {
    let origin = current_origin();
    let mut ring = match self.ring.write() {
      Ok(guard) => guard,
      // 锁中毒只可能来自持锁 panic；诊断日志丢一条无妨
      // A poisoned lock means a panic while holding it; dropping one diagnostic entry is fine
      Err(_) => return,
    };
    let seq = ring.next_seq;
    ring.next_seq += 1;
    let entry = DevLogEntry {
      seq,
      time: Utc::now(),
      origin,
      kind,
      command,
      duration,
    };
    if ring.full {
      let head = ring.head;
      ring.entries[head] = entry;
      ring.head = (head + 1) % self.capacity;
    } else {
      ring.entries.push(entry);
      if ring.entries.len() == self.capacity {
        ring.full = true;
        ring.head = 0;
      }
    }
  }

  /// 按时间顺序返回所有条目
  /// Return all entries in chronological order
  pub fn log_entries(&self) -> Vec<DevLogEntry> {
    let ring = match self.ring.read() {
      Ok(guard) => guard,
      Err(_) => return Vec::new(),
    };
    if ring.full {
      let mut out = Vec::with_capacity(self.capacity);
      out.extend_from_slice(&ring.entries[ring.head..]);
      out.extend_from_slice(&ring.entries[..ring.head]);
      out
    } else {
      ring.entries.clone()
    }
  }

  /// 当前条目数
  /// Current entry count
  pub fn len(&self) -> usize {
    self.ring.read().map(|r| r.entries.len()).unwrap_or(0)
  }

  /// 是否为空
  /// Whether the ring is empty
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 清空环
  /// Clear the ring
  pub fn clear(&self) {
    if let Ok(mut ring) = self.ring.write() {
      ring.entries.clear();
      ring.head = 0;
      ring.full = false;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ring_overwrites_oldest() {
    let tracker = DevTracker::new(3);
    for i in 0..5 {
      tracker.append_log(LogKind::Command, format!("GET key{i}"), None);
    }
    let entries = tracker.log_entries();
    assert_eq!(entries.len(), 3);
    // 最老的两条被覆盖，剩余按时间顺序
    // The two oldest were overwritten; the rest stay chronological
    assert_eq!(entries[0].command, "GET key2");
    assert_eq!(entries[2].command, "GET key4");
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn test_ring_below_capacity() {
    let tracker = DevTracker::new(10);
    tracker.append_log(LogKind::PipelineBegin, "LLEN a; LLEN b".to_string(), None);
    tracker.append_log(
      LogKind::PipelineExec,
      "2 commands".to_string(),
      Some(Duration::from_millis(3)),
    );
    let entries = tracker.log_entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, LogKind::PipelineBegin);
    assert_eq!(entries[1].seq, 1);
  }

  #[test]
  fn test_clear() {
    let tracker = DevTracker::new(2);
    tracker.append_log(LogKind::Command, "PING".to_string(), None);
    tracker.clear();
    assert!(tracker.is_empty());
    // 序号在清空后继续递增
    // Sequence numbers keep increasing after a clear
    tracker.append_log(LogKind::Command, "PING".to_string(), None);
    assert_eq!(tracker.log_entries()[0].seq, 1);
  }

  #[tokio::test]
  async fn test_origin_propagation() {
    assert_eq!(current_origin(), "unknown");
    let origin = with_origin("busy-view", async { current_origin() }).await;
    assert_eq!(origin, "busy-view");

    let tracker = DevTracker::new(4);
    with_origin("queues-view", async {
      tracker.append_log(LogKind::Command, "SMEMBERS queues".to_string(), None);
    })
    .await;
    tracker.append_log(LogKind::Command, "PING".to_string(), None);
    let entries = tracker.log_entries();
    assert_eq!(entries[0].origin, "queues-view");
    assert_eq!(entries[1].origin, "unknown");
  }
}
