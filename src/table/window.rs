//! 有序集合的窗口适配器
//! Windowing adapter for sorted sets
//!
//! 把「过滤扫描」和「窗口分页」两种取数方式归一成同一种结果；窗口起点越界时
//! 夹回有效范围并恰好重取一次
//! Unifies filtered scans and windowed pagination into one result shape; when the window start
//! falls past the end it is clamped back in range and re-fetched exactly once

use std::cmp::max;
use std::future::Future;

use crate::error::Result;
use crate::job::SortedEntry;

/// 取数参数
/// Fetch parameters
#[derive(Debug, Clone)]
pub struct WindowParams {
  pub filter: String,
  pub window_start: i64,
  pub window_size: i64,
  pub window_pages: i64,
  pub fallback_page_size: i64,
}

/// 归一后的结果
/// The unified result
#[derive(Debug, Clone)]
pub struct WindowedJobs {
  pub jobs: Vec<SortedEntry>,
  pub total: i64,
  pub window_start: i64,
  /// 集合里分数最小的条目
  /// The entry with the lowest score in the set
  pub first: Option<SortedEntry>,
  /// 集合里分数最大的条目
  /// The entry with the highest score in the set
  pub last: Option<SortedEntry>,
}

impl WindowedJobs {
  fn empty() -> Self {
    Self {
      jobs: Vec::new(),
      total: 0,
      window_start: 0,
      first: None,
      last: None,
    }
  }
}

/// 过滤非空走全量扫描，否则按窗口分页取一段
/// Scans the whole set when the filter is non-empty, otherwise pages one window
pub async fn windowed_sorted_fetch<S, SF, F, FF, B, BF>(
  params: WindowParams,
  scan: S,
  fetch: F,
  bounds: B,
) -> Result<WindowedJobs>
where
  S: Fn(String) -> SF,
  SF: Future<Output = Result<Vec<SortedEntry>>>,
  F: Fn(i64, i64) -> FF,
  FF: Future<Output = Result<(Vec<SortedEntry>, i64)>>,
  B: FnOnce() -> BF,
  BF: Future<Output = Result<(Option<SortedEntry>, Option<SortedEntry>)>>,
{
  if !params.filter.is_empty() {
    let jobs = scan(params.filter.clone()).await?;
    let total = jobs.len() as i64;
    let first = jobs
      .iter()
      .min_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
      .cloned();
    let last = jobs
      .iter()
      .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
      .cloned();
    return Ok(WindowedJobs {
      jobs,
      total,
      window_start: 0,
      first,
      last,
    });
  }

  let window_size = if params.window_size < 1 {
    max(params.fallback_page_size, 1) * max(params.window_pages, 1)
  } else {
    params.window_size
  };
  let mut window_start = max(params.window_start, 0);

  let (mut jobs, mut total) = fetch(window_start, window_size).await?;
  if total == 0 {
    return Ok(WindowedJobs::empty());
  }

  // 刷新间隙集合缩短时窗口可能越界，夹回后恰好重取一次
  // The set can shrink between refreshes, leaving the window past the end; clamp and
  // re-fetch exactly once
  let max_start = max(total - window_size, 0);
  if window_start > max_start {
    window_start = max_start;
    let refetched = fetch(window_start, window_size).await?;
    jobs = refetched.0;
    total = refetched.1;
    if total == 0 {
      return Ok(WindowedJobs::empty());
    }
  }

  let (first, last) = bounds().await?;
  Ok(WindowedJobs {
    jobs,
    total,
    window_start,
    first,
    last,
  })
}
