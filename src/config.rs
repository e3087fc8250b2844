//! 配置模块
//! Configuration module
//!
//! 仪表盘核心的可配置项：危险操作开关、懒加载表调优、指标追踪
//! Tunables for the dashboard core: dangerous-action gating, lazy-table tuning, metrics tracking

use crate::error::{Error, Result};
use std::time::Duration;

/// 默认窗口页数：内存窗口覆盖多少个视口页
/// Default window pages: how many viewport pages the in-memory window spans
pub const DEFAULT_WINDOW_PAGES: usize = 3;

/// 视口高度未知时的回退页大小
/// Fallback page size used while the viewport height is unknown
pub const DEFAULT_FALLBACK_PAGE_SIZE: usize = 25;

/// 默认周期刷新间隔
/// Default periodic refresh interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// 扫描模式下每次 ZRANGE 的块大小
/// Chunk size per ZRANGE round trip in scan mode
pub const DEFAULT_SCAN_CHUNK_SIZE: usize = 1000;

/// 仪表盘配置
/// Dashboard configuration
#[derive(Debug, Clone)]
pub struct Config {
  /// Redis 连接 URL
  /// Redis connection URL
  pub redis_url: String,
  /// 是否启用危险操作（删除、立即重试、杀死、暂停、停止、清空队列）
  /// Whether dangerous actions are enabled (delete, retry-now, kill, pause, stop, clear)
  pub dangerous_actions_enabled: bool,
  /// 懒加载表的窗口页数
  /// Window pages for the lazy table
  pub window_pages: usize,
  /// 懒加载表的回退页大小
  /// Fallback page size for the lazy table
  pub fallback_page_size: usize,
  /// 是否启用开发追踪器记录
  /// Whether dev-tracker recording is enabled
  pub metrics_tracking_enabled: bool,
  /// 追踪器的默认来源标签
  /// Default origin label for the tracker
  pub origin_label: Option<String>,
  /// 周期刷新间隔
  /// Periodic refresh interval
  pub refresh_interval: Duration,
  /// 扫描模式的块大小
  /// Scan-mode chunk size
  pub scan_chunk_size: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      redis_url: "redis://127.0.0.1:6379".to_string(),
      dangerous_actions_enabled: false,
      window_pages: DEFAULT_WINDOW_PAGES,
      fallback_page_size: DEFAULT_FALLBACK_PAGE_SIZE,
      metrics_tracking_enabled: false,
      origin_label: None,
      refresh_interval: DEFAULT_REFRESH_INTERVAL,
      scan_chunk_size: DEFAULT_SCAN_CHUNK_SIZE,
    }
  }
}

impl Config {
  /// 使用给定的 Redis URL 创建配置
  /// Create a configuration with the given Redis URL
  pub fn new<S: Into<String>>(redis_url: S) -> Self {
    Self {
      redis_url: redis_url.into(),
      ..Default::default()
    }
  }

  /// 从环境变量读取配置（`REDIS_URL`，缺省本机）
  /// Read configuration from the environment (`REDIS_URL`, defaulting to localhost)
  pub fn from_env() -> Self {
    match std::env::var("REDIS_URL") {
      Ok(url) if !url.trim().is_empty() => Self::new(url),
      _ => Self::default(),
    }
  }

  /// 启用危险操作
  /// Enable dangerous actions
  pub fn with_dangerous_actions(mut self, enabled: bool) -> Self {
    self.dangerous_actions_enabled = enabled;
    self
  }

  /// 设置窗口页数
  /// Set window pages
  pub fn with_window_pages(mut self, pages: usize) -> Self {
    self.window_pages = pages;
    self
  }

  /// 设置回退页大小
  /// Set fallback page size
  pub fn with_fallback_page_size(mut self, size: usize) -> Self {
    self.fallback_page_size = size;
    self
  }

  /// 启用开发追踪器并设置来源标签
  /// Enable the dev tracker with an origin label
  pub fn with_metrics_tracking<S: Into<String>>(mut self, origin_label: S) -> Self {
    self.metrics_tracking_enabled = true;
    self.origin_label = Some(origin_label.into());
    self
  }

  /// 设置刷新间隔
  /// Set the refresh interval
  pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
    self.refresh_interval = interval;
    self
  }

  /// 设置扫描块大小
  /// Set the scan chunk size
  pub fn with_scan_chunk_size(mut self, size: usize) -> Self {
    self.scan_chunk_size = size;
    self
  }

  /// 校验配置
  /// Validate the configuration
  pub fn validate(&self) -> Result<()> {
    if self.redis_url.trim().is_empty() {
      return Err(Error::config("redis_url must not be empty"));
    }
    if self.window_pages == 0 {
      return Err(Error::config("window_pages must be at least 1"));
    }
    if self.fallback_page_size == 0 {
      return Err(Error::config("fallback_page_size must be at least 1"));
    }
    if self.scan_chunk_size == 0 {
      return Err(Error::config("scan_chunk_size must be at least 1"));
    }
    Ok(())
  }
}
