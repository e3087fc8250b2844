//! 指标读取 - 按周期聚合的任务类统计、直方图、每日历史与 Redis 信息
//! Metrics reads - per-period class aggregates, histograms, daily history, and Redis info
//!
//! 周期表由门面拥有且随 Sidekiq 版本变化；核心把周期列表当作不透明值
//! The period tables are facade-owned and version-sensitive; the core treats the list as opaque

use crate::base::{keys, MetricsJobDetail, MetricsJobRow, MetricsPeriod, RedisInfo};
use crate::error::{Error, Result};
use crate::histogram::BUCKET_COUNT;
use crate::job::{DailyStat, MetricsJobTotals};
use crate::rdb::SidekiqClient;
use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use redis::{AsyncCommands, Value};
use std::collections::HashMap;

/// 所有版本都有的周期
/// Periods every version has
pub const SHORT_PERIODS: [MetricsPeriod; 4] = [
  MetricsPeriod {
    label: "1h",
    minutes: 60,
    step_minutes: 1,
  },
  MetricsPeriod {
    label: "2h",
    minutes: 120,
    step_minutes: 1,
  },
  MetricsPeriod {
    label: "4h",
    minutes: 240,
    step_minutes: 2,
  },
  MetricsPeriod {
    label: "8h",
    minutes: 480,
    step_minutes: 2,
  },
];

/// Sidekiq 8 起保留更久的指标数据
/// Sidekiq 8 retains metrics for longer
pub const LONG_PERIODS: [MetricsPeriod; 3] = [
  MetricsPeriod {
    label: "24h",
    minutes: 1_440,
    step_minutes: 5,
  },
  MetricsPeriod {
    label: "48h",
    minutes: 2_880,
    step_minutes: 10,
  },
  MetricsPeriod {
    label: "72h",
    minutes: 4_320,
    step_minutes: 15,
  },
];

/// 按主版本选择周期表；未知版本用短表
/// Pick the period table by major version; unknown versions get the short table
pub fn periods_for_version(major: Option<u32>) -> Vec<MetricsPeriod> {
  let mut periods = SHORT_PERIODS.to_vec();
  if matches!(major, Some(v) if v >= 8) {
    periods.extend_from_slice(&LONG_PERIODS);
  }
  periods
}

/// 周期覆盖的采样分钟，最新在前
/// Sampled minutes the period covers, newest first
fn sampled_minutes(period: MetricsPeriod, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
  let head = now
    .duration_trunc(Duration::minutes(1))
    .unwrap_or(now);
  (0..period.minutes)
    .step_by(period.step_minutes.max(1) as usize)
    .map(|back| head - Duration::minutes(back))
    .collect()
}

/// 指标分钟哈希的字段名：<class>|p / <class>|f / <class>|ms
/// Minute hash field names: <class>|p / <class>|f / <class>|ms
fn split_metric_field(field: &str) -> Option<(&str, &str)> {
  field.rsplit_once('|')
}

fn parse_count(value: &str) -> i64 {
  value.parse::<i64>().unwrap_or(0)
}

impl SidekiqClient {
  /// 任一已注册进程上报的 Sidekiq 主版本
  /// The Sidekiq major version reported by any registered process
  async fn sidekiq_major_version(&self) -> Result<Option<u32>> {
    let mut conn = self.conn();
    let mut identities: Vec<String> = conn.smembers(keys::PROCESSES).await?;
    identities.sort();
    let Some(identity) = identities.first() else {
      return Ok(None);
    };
    let info: Option<String> = conn.hget(keys::process_key(identity), "info").await?;
    let Some(info) = info else {
      return Ok(None);
    };
    let parsed: serde_json::Value = serde_json::from_str(&info)?;
    let major = parsed
      .get("version")
      .and_then(serde_json::Value::as_str)
      .and_then(|version| version.split('.').next())
      .and_then(|major| major.parse::<u32>().ok());
    Ok(major)
  }

  pub(crate) async fn period_order(&self) -> Result<Vec<MetricsPeriod>> {
    let major = self.sidekiq_major_version().await?;
    Ok(periods_for_version(major))
  }

  pub(crate) async fn top_jobs(
    &self,
    period: MetricsPeriod,
    class_filter: &str,
  ) -> Result<Vec<MetricsJobRow>> {
    let minutes = sampled_minutes(period, Utc::now());
    let mut conn = self.conn();

    let mut pipe = redis::pipe();
    for minute in &minutes {
      pipe.cmd("HGETALL").arg(keys::metrics_minute_key(minute));
    }
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != minutes.len() {
      return Err(Error::invalid_response("metrics pipeline shape"));
    }

    let mut totals: HashMap<String, MetricsJobTotals> = HashMap::new();
    for reply in &replies {
      let hash: HashMap<String, String> = super::from_value(reply, "metrics minute hash")?;
      for (field, value) in &hash {
        let Some((class, stat)) = split_metric_field(field) else {
          continue;
        };
        let entry = totals.entry(class.to_string()).or_default();
        match stat {
          "p" => entry.processed += parse_count(value),
          "f" => entry.failed += parse_count(value),
          "ms" => entry.seconds += parse_count(value) as f64 / 1000.0,
          _ => {}
        }
      }
    }

    let needle = class_filter.to_lowercase();
    let mut rows: Vec<MetricsJobRow> = totals
      .into_iter()
      .filter(|(class, _)| needle.is_empty() || class.to_lowercase().contains(&needle))
      .map(|(class, totals)| MetricsJobRow { class, totals })
      .collect();
    // 处理量多的类排在前面，同量按类名
    // Busiest classes first, ties by class name
    rows.sort_by(|a, b| {
      b.totals
        .processed
        .cmp(&a.totals.processed)
        .then_with(|| a.class.cmp(&b.class))
    });
    Ok(rows)
  }

  pub(crate) async fn job_detail(
    &self,
    class: &str,
    period: MetricsPeriod,
  ) -> Result<MetricsJobDetail> {
    let now = Utc::now();
    let minutes = sampled_minutes(period, now);
    let mut conn = self.conn();

    // 每个采样分钟两条命令：该类的直方图哈希 + 分钟哈希中该类的三个字段
    // Two commands per sampled minute: the class histogram hash + the class's three minute fields
    let mut pipe = redis::pipe();
    for minute in &minutes {
      pipe.cmd("HGETALL").arg(keys::histogram_key(class, minute));
      pipe
        .cmd("HMGET")
        .arg(keys::metrics_minute_key(minute))
        .arg(format!("{class}|p"))
        .arg(format!("{class}|f"))
        .arg(format!("{class}|ms"));
    }
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != minutes.len() * 2 {
      return Err(Error::invalid_response("metrics detail pipeline shape"));
    }

    let mut histogram = HashMap::new();
    let mut totals = MetricsJobTotals::default();
    for (minute, chunk) in minutes.iter().zip(replies.chunks(2)) {
      let hash: HashMap<String, String> = super::from_value(&chunk[0], "histogram hash")?;
      if !hash.is_empty() {
        let mut buckets = vec![0u64; BUCKET_COUNT];
        for (field, value) in &hash {
          if let Ok(bucket) = field.parse::<usize>() {
            if bucket < BUCKET_COUNT {
              buckets[bucket] = value.parse::<u64>().unwrap_or(0);
            }
          }
        }
        histogram.insert(minute.to_rfc3339_opts(SecondsFormat::Secs, true), buckets);
      }

      let fields: Vec<Option<String>> = super::from_value(&chunk[1], "minute fields")?;
      if let [p, f, ms] = fields.as_slice() {
        totals.processed += p.as_deref().map(parse_count).unwrap_or(0);
        totals.failed += f.as_deref().map(parse_count).unwrap_or(0);
        totals.seconds += ms.as_deref().map(parse_count).unwrap_or(0) as f64 / 1000.0;
      }
    }

    Ok(MetricsJobDetail {
      class: class.to_string(),
      period,
      totals,
      histogram,
      range: (now - Duration::minutes(period.minutes), now),
    })
  }

  pub(crate) async fn stats_history(&self, days: i64) -> Result<Vec<DailyStat>> {
    if days < 1 {
      return Err(Error::invariant(format!("stats history days: {days}")));
    }
    let today = Utc::now();
    let dates: Vec<DateTime<Utc>> = (0..days).map(|back| today - Duration::days(back)).collect();

    let mut conn = self.conn();
    let mut pipe = redis::pipe();
    for date in &dates {
      pipe.cmd("GET").arg(keys::processed_key(date));
      pipe.cmd("GET").arg(keys::failed_key(date));
    }
    let replies: Vec<Value> = pipe.query_async(&mut conn).await?;
    if replies.len() != dates.len() * 2 {
      return Err(Error::invalid_response("stats history pipeline shape"));
    }

    // 今天在前
    // Today first
    let mut history = Vec::with_capacity(dates.len());
    for (date, chunk) in dates.iter().zip(replies.chunks(2)) {
      let processed: Option<String> = super::from_value(&chunk[0], "processed stat")?;
      let failed: Option<String> = super::from_value(&chunk[1], "failed stat")?;
      history.push(DailyStat {
        date: date.date_naive(),
        processed: processed.as_deref().map(parse_count).unwrap_or(0),
        failed: failed.as_deref().map(parse_count).unwrap_or(0),
      });
    }
    Ok(history)
  }

  pub(crate) async fn redis_info(&self) -> Result<RedisInfo> {
    let mut conn = self.conn();
    let raw: String = redis::cmd("INFO").query_async(&mut conn).await?;
    let total_keys: i64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
    let mut info = parse_redis_info(&raw);
    info.total_keys = total_keys;
    Ok(info)
  }
}

/// 从 INFO 回复中提取仪表盘展示的字段
/// Extract the fields the dashboard shows from an INFO reply
fn parse_redis_info(raw: &str) -> RedisInfo {
  let mut fields: HashMap<&str, &str> = HashMap::new();
  for line in raw.lines() {
    if let Some((key, value)) = line.split_once(':') {
      fields.insert(key.trim(), value.trim());
    }
  }
  RedisInfo {
    version: fields.get("redis_version").unwrap_or(&"").to_string(),
    uptime_in_days: fields
      .get("uptime_in_days")
      .and_then(|v| v.parse().ok())
      .unwrap_or(0),
    connected_clients: fields
      .get("connected_clients")
      .and_then(|v| v.parse().ok())
      .unwrap_or(0),
    used_memory_human: fields.get("used_memory_human").unwrap_or(&"").to_string(),
    used_memory_peak_human: fields
      .get("used_memory_peak_human")
      .unwrap_or(&"")
      .to_string(),
    total_keys: 0,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_periods_for_version() {
    let short = periods_for_version(Some(7));
    assert_eq!(short.len(), 4);
    assert_eq!(short[0].label, "1h");
    assert_eq!(short[3].label, "8h");

    let long = periods_for_version(Some(8));
    assert_eq!(long.len(), 7);
    assert_eq!(long[6].label, "72h");

    // 未知版本回落到短表
    // Unknown versions fall back to the short table
    assert_eq!(periods_for_version(None).len(), 4);
    assert_eq!(periods_for_version(Some(6)).len(), 4);
  }

  #[test]
  fn test_sampled_minutes() {
    let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 30, 45).unwrap();
    let minutes = sampled_minutes(SHORT_PERIODS[0], now);
    assert_eq!(minutes.len(), 60);
    // 截断到整分钟，最新在前
    // Truncated to the minute, newest first
    assert_eq!(minutes[0], Utc.with_ymd_and_hms(2024, 3, 7, 12, 30, 0).unwrap());
    assert_eq!(minutes[1], Utc.with_ymd_and_hms(2024, 3, 7, 12, 29, 0).unwrap());

    let coarse = sampled_minutes(LONG_PERIODS[0], now);
    assert_eq!(coarse.len(), 288);
  }

  #[test]
  fn test_split_metric_field() {
    assert_eq!(split_metric_field("HardJob|p"), Some(("HardJob", "p")));
    assert_eq!(
      split_metric_field("Name|With|Pipes|ms"),
      Some(("Name|With|Pipes", "ms"))
    );
    assert_eq!(split_metric_field("noseparator"), None);
  }

  #[test]
  fn test_parse_redis_info() {
    let raw = "# Server\r\nredis_version:7.2.4\r\nuptime_in_days:12\r\n# Clients\r\nconnected_clients:8\r\nused_memory_human:1.5M\r\nused_memory_peak_human:2.1M\r\n";
    let info = parse_redis_info(raw);
    assert_eq!(info.version, "7.2.4");
    assert_eq!(info.uptime_in_days, 12);
    assert_eq!(info.connected_clients, 8);
    assert_eq!(info.used_memory_human, "1.5M");
    assert_eq!(info.used_memory_peak_human, "2.1M");
  }
}
