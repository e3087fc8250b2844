//! Redis 键名布局 - 与 Sidekiq 的键约定保持兼容
//! Redis key layout - Compatible with Sidekiq's key conventions
//!
//! 仪表盘核心从不直接拼接键名；所有布局知识都集中在这里
//! The dashboard core never builds keys itself; all layout knowledge lives here

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// 全局 Redis 键
/// Global Redis keys
pub const QUEUES: &str = "queues";
pub const RETRY: &str = "retry";
pub const SCHEDULE: &str = "schedule";
pub const DEAD: &str = "dead";
pub const PROCESSES: &str = "processes";
pub const STAT_PROCESSED: &str = "stat:processed";
pub const STAT_FAILED: &str = "stat:failed";

/// 统计键的日期格式
/// Date format for stat keys
pub const STAT_DATE_FORMAT: &str = "%Y-%m-%d";

/// 指标分钟键的日期与时间格式
/// Date and time formats for metrics minute keys
pub const METRICS_DATE_FORMAT: &str = "%Y%m%d";
pub const METRICS_MINUTE_FORMAT: &str = "%-H:%M";

/// 仪表盘分页浏览的三个有序集合
/// The three sorted sets the dashboard pages over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortedSetKind {
  /// 等待重试的失败任务（按下次重试时间排序）
  /// Failed jobs awaiting retry (ordered by next retry time)
  Retry,
  /// 计划在将来执行的任务（按计划时间排序）
  /// Jobs scheduled for the future (ordered by scheduled-at)
  Scheduled,
  /// 重试耗尽后死亡的任务（按死亡时间排序）
  /// Jobs that exhausted retries (ordered by died-at)
  Dead,
}

impl SortedSetKind {
  /// 返回该集合的 Redis 键
  /// Return the Redis key for this set
  pub fn key(&self) -> &'static str {
    match self {
      Self::Retry => RETRY,
      Self::Scheduled => SCHEDULE,
      Self::Dead => DEAD,
    }
  }

  /// 转换为显示字符串
  /// Convert to a display string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Retry => "retry",
      Self::Scheduled => "scheduled",
      Self::Dead => "dead",
    }
  }
}

impl FromStr for SortedSetKind {
  type Err = ();

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "retry" => Ok(Self::Retry),
      "scheduled" => Ok(Self::Scheduled),
      "dead" => Ok(Self::Dead),
      _ => Err(()),
    }
  }
}

impl fmt::Display for SortedSetKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 生成队列键：queue:<name>
/// Generate a queue key: queue:<name>
pub fn queue_key(qname: &str) -> String {
  format!("queue:{qname}")
}

/// 生成进程信息哈希键（键名就是进程身份 host:pid:nonce）
/// Generate the process info hash key (the key is the identity host:pid:nonce)
pub fn process_key(identity: &str) -> String {
  identity.to_string()
}

/// 生成进程工作哈希键：<identity>:work
/// Generate the per-process work hash key: <identity>:work
pub fn work_key(identity: &str) -> String {
  format!("{identity}:work")
}

/// 生成进程信号列表键：<identity>-signals
/// Generate the per-process signal list key: <identity>-signals
pub fn signal_key(identity: &str) -> String {
  format!("{identity}-signals")
}

/// 生成按日处理数键：stat:processed:<date>
/// Generate the daily processed key: stat:processed:<date>
pub fn processed_key(date: &DateTime<Utc>) -> String {
  format!("{}:{}", STAT_PROCESSED, date.format(STAT_DATE_FORMAT))
}

/// 生成按日失败数键：stat:failed:<date>
/// Generate the daily failed key: stat:failed:<date>
pub fn failed_key(date: &DateTime<Utc>) -> String {
  format!("{}:{}", STAT_FAILED, date.format(STAT_DATE_FORMAT))
}

/// 生成指标分钟哈希键：j|<YYYYMMDD>|<H:MM>
/// Generate the metrics minute hash key: j|<YYYYMMDD>|<H:MM>
///
/// 字段为 `<class>|p`、`<class>|f`、`<class>|ms`
/// Fields are `<class>|p`, `<class>|f`, `<class>|ms`
pub fn metrics_minute_key(minute: &DateTime<Utc>) -> String {
  format!(
    "j|{}|{}",
    minute.format(METRICS_DATE_FORMAT),
    minute.format(METRICS_MINUTE_FORMAT)
  )
}

/// 生成任务类的直方图哈希键：h|<class>-<YYYYMMDD>|<H:MM>
/// Generate the per-class histogram hash key: h|<class>-<YYYYMMDD>|<H:MM>
///
/// 字段为桶下标，值为计数
/// Fields are bucket indices, values are counts
pub fn histogram_key(class: &str, minute: &DateTime<Utc>) -> String {
  format!(
    "h|{}-{}|{}",
    class,
    minute.format(METRICS_DATE_FORMAT),
    minute.format(METRICS_MINUTE_FORMAT)
  )
}
