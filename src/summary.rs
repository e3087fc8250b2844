//! 错误汇总模块
//! Error summary module
//!
//! 在死亡与重试集合的全量快照上按 (类, 错误类, 队列) 聚合
//! Aggregates full dead and retry snapshots by (class, error class, queue)

use crate::job::SortedEntry;
use std::collections::BTreeMap;

/// 字段缺失时的占位
/// Placeholder for missing fields
const UNKNOWN: &str = "unknown";

/// 条目来自哪个集合
/// Which set an entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarySource {
  Dead,
  Retry,
}

/// 汇总里的一条带来源条目
/// One source-annotated entry within a summary row
#[derive(Debug, Clone)]
pub struct SummaryEntry {
  pub source: SummarySource,
  pub entry: SortedEntry,
}

/// 一行汇总：一个 (展示类, 错误类, 队列) 组
/// One summary row: a (display class, error class, queue) group
#[derive(Debug, Clone)]
pub struct ErrorSummaryRow {
  pub display_class: String,
  pub error_class: String,
  pub queue: String,
  pub count: usize,
  /// 代表性消息：该组第一条修剪后非空的错误消息
  /// Representative message: the group's first trimmed non-empty error message
  pub message: String,
  pub entries: Vec<SummaryEntry>,
}

fn or_unknown(value: &str) -> String {
  if value.trim().is_empty() {
    UNKNOWN.to_string()
  } else {
    value.to_string()
  }
}

/// 构建错误汇总；行按 (展示类, 错误类, 队列, 消息) 升序
/// Build the error summary; rows sorted ascending by (display class, error class, queue, message)
pub fn build_error_summary(dead: &[SortedEntry], retries: &[SortedEntry]) -> Vec<ErrorSummaryRow> {
  let mut groups: BTreeMap<(String, String, String), ErrorSummaryRow> = BTreeMap::new();

  let annotated = dead
    .iter()
    .map(|entry| (SummarySource::Dead, entry))
    .chain(retries.iter().map(|entry| (SummarySource::Retry, entry)));

  for (source, entry) in annotated {
    let envelope = &entry.envelope;
    let key = (
      or_unknown(envelope.display_class()),
      or_unknown(envelope.error_class()),
      or_unknown(envelope.queue()),
    );
    let row = groups.entry(key.clone()).or_insert_with(|| ErrorSummaryRow {
      display_class: key.0.clone(),
      error_class: key.1.clone(),
      queue: key.2.clone(),
      count: 0,
      message: String::new(),
      entries: Vec::new(),
    });
    row.count += 1;
    if row.message.is_empty() {
      let message = envelope.error_message().trim();
      if !message.is_empty() {
        row.message = message.to_string();
      }
    }
    row.entries.push(SummaryEntry {
      source,
      entry: entry.clone(),
    });
  }

  let mut rows: Vec<ErrorSummaryRow> = groups
    .into_values()
    .map(|mut row| {
      if row.message.is_empty() {
        row.message = UNKNOWN.to_string();
      }
      row
    })
    .collect();
  // BTreeMap 已按 (类, 错误类, 队列) 排好；消息作为最后一级平局裁决
  // BTreeMap already orders by (class, error class, queue); message is the final tie-break
  rows.sort_by(|a, b| {
    (&a.display_class, &a.error_class, &a.queue, &a.message).cmp(&(
      &b.display_class,
      &b.error_class,
      &b.queue,
      &b.message,
    ))
  });
  rows
}
