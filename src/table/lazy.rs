//! 懒加载窗口表格
//! Lazily loaded windowed table
//!
//! 只保留数据集的一个滑动窗口；导航到窗口边缘时预取相邻窗口，
//! 用单调递增的请求号丢弃过期响应
//! Holds only a sliding window over the dataset; prefetches the adjacent window when navigation
//! reaches the window edge, and discards stale responses via a monotonically increasing request id

use std::cmp::max;
use std::sync::Arc;

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent};

use crate::error::{Error, Result};
use crate::table::{JobTable, TableOptions};

/// 响应到达后游标的落点
/// Where the cursor lands once a response arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorIntent {
  /// 窗口第一行
  /// First row of the window
  Start,
  /// 窗口最后一行
  /// Last row of the window
  End,
  /// 保持发起请求时的绝对行号
  /// Keep the absolute index the cursor had when the request was issued
  Keep,
}

/// 一次窗口请求
/// One window request
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest {
  /// 数据集内的 0 基窗口起点
  /// 0-based window start within the dataset
  pub window_start: i64,
  /// 请求的窗口行数
  /// Requested window size in rows
  pub window_size: i64,
  pub cursor_intent: CursorIntent,
}

/// 一次窗口响应
/// One window response
#[derive(Debug, Clone)]
pub struct FetchResult<P> {
  /// 渲染好的单元格文本
  /// Pre-rendered cell text
  pub rows: Vec<Vec<String>>,
  /// 数据集总行数
  /// Total rows in the dataset
  pub total: i64,
  /// 数据源实际使用的窗口起点，可能被夹持过
  /// The window start the source actually used, possibly clamped
  pub window_start: i64,
  /// 与行平行的领域数据，按行号取回
  /// Domain payload parallel to the rows, looked up by row index
  pub payload: P,
}

/// 窗口数据源
/// Window data source
#[async_trait]
pub trait Fetcher<P>: Send + Sync {
  async fn fetch(&self, req: FetchRequest) -> Result<FetchResult<P>>;
}

/// 回灌给表格的响应消息
/// Response message fed back into the table
#[derive(Debug)]
pub struct DataMsg<P> {
  pub request_id: u64,
  pub intent: CursorIntent,
  pub result: Result<FetchResult<P>>,
}

/// 待执行的取数命令；宿主在后台任务里跑 `run`，把产出的消息回灌
/// A pending fetch command; the host runs `run` on a background task and feeds the message back
pub struct FetchCommand<P> {
  request_id: u64,
  intent: CursorIntent,
  request: FetchRequest,
  fetcher: Arc<dyn Fetcher<P>>,
}

impl<P> FetchCommand<P> {
  pub fn request(&self) -> FetchRequest {
    self.request
  }

  pub async fn run(self) -> DataMsg<P> {
    let result = self.fetcher.fetch(self.request).await;
    DataMsg {
      request_id: self.request_id,
      intent: self.intent,
      result,
    }
  }
}

/// 表格能消费的消息
/// Messages the table consumes
pub enum LazyMsg<P> {
  Data(DataMsg<P>),
  Key(KeyEvent),
  Refresh,
  Resize { height: u16 },
}

/// 消费一条消息后的产出
/// What consuming one message yields
pub enum LazyEvent<P> {
  /// 无事发生
  /// Nothing to do
  Idle,
  /// 宿主需要执行这条取数命令
  /// The host must run this fetch command
  Fetch(FetchCommand<P>),
  /// 取数失败，交给宿主上报
  /// The fetch failed, hand it to the host to surface
  Failed(Error),
}

/// 懒加载表格
/// The lazy table
pub struct LazyTable<P> {
  table: JobTable,
  fetcher: Arc<dyn Fetcher<P>>,
  /// 单调递增；响应携带的号不等于当前号就丢弃
  /// Monotonically increasing; responses carrying a different id are discarded
  request_id: u64,
  window_start: i64,
  window_size: i64,
  total: i64,
  payload: Option<P>,
  loading: bool,
  window_pages: i64,
  fallback_page_size: i64,
}

impl<P> LazyTable<P> {
  pub fn new(
    options: TableOptions,
    fetcher: Arc<dyn Fetcher<P>>,
    window_pages: u16,
    fallback_page_size: u16,
  ) -> Self {
    Self {
      table: JobTable::new(options),
      fetcher,
      request_id: 0,
      window_start: 0,
      window_size: 0,
      total: 0,
      payload: None,
      loading: false,
      window_pages: max(window_pages as i64, 1),
      fallback_page_size: max(fallback_page_size as i64, 1),
    }
  }

  /// 内嵌表格
  /// The embedded table
  pub fn table(&self) -> &JobTable {
    &self.table
  }

  pub fn table_mut(&mut self) -> &mut JobTable {
    &mut self.table
  }

  /// 当前总行数
  /// Current total row count
  pub fn total(&self) -> i64 {
    self.total
  }

  /// 当前窗口在数据集内的起点
  /// The current window's start within the dataset
  pub fn window_start(&self) -> i64 {
    self.window_start
  }

  /// 当前请求号；宿主用它核对回灌的响应
  /// The current request id; hosts use it to correlate fed-back responses
  pub fn request_id(&self) -> u64 {
    self.request_id
  }

  /// 是否有在途请求
  /// Whether a request is in flight
  pub fn loading(&self) -> bool {
    self.loading
  }

  /// 游标在数据集里的绝对行号
  /// The cursor's absolute index within the dataset
  pub fn absolute_cursor(&self) -> i64 {
    self.window_start + self.table.cursor() as i64
  }

  /// 游标行的领域数据
  /// Domain payload of the cursor row
  pub fn payload(&self) -> Option<&P> {
    self.payload.as_ref()
  }

  /// 位置标签用的区间：1 基的 (first, last, total)
  /// The range for position labels: 1-based (first, last, total)
  pub fn range(&self) -> (i64, i64, i64) {
    if self.table.is_empty() {
      (0, 0, self.total)
    } else {
      (
        self.window_start + 1,
        self.window_start + self.table.len() as i64,
        self.total,
      )
    }
  }

  /// 清空并使所有在途响应失效
  /// Clear and invalidate every in-flight response
  pub fn reset(&mut self) {
    self.request_id += 1;
    self.window_start = 0;
    self.window_size = 0;
    self.total = 0;
    self.payload = None;
    self.loading = false;
    self.table.set_rows(Vec::new());
    self.table.set_cursor(0);
  }

  /// 从头加载
  /// Load from the top
  pub fn first_fetch(&mut self) -> LazyEvent<P> {
    self.request_window(0, CursorIntent::Start)
  }

  pub fn update(&mut self, msg: LazyMsg<P>) -> LazyEvent<P> {
    match msg {
      LazyMsg::Data(data) => self.reconcile(data),
      LazyMsg::Key(key) => self.handle_key(key),
      LazyMsg::Refresh => {
        if self.loading {
          LazyEvent::Idle
        } else {
          self.request_window(self.window_start, CursorIntent::Keep)
        }
      }
      LazyMsg::Resize { height } => {
        self.table.set_height(height);
        LazyEvent::Idle
      }
    }
  }

  /// 发起一次窗口请求
  /// Issue one window request
  fn request_window(&mut self, window_start: i64, intent: CursorIntent) -> LazyEvent<P> {
    self.request_id += 1;
    self.loading = true;
    let page = if self.table.height() > 0 {
      self.table.height() as i64
    } else {
      self.fallback_page_size
    };
    let window_size = page * self.window_pages;
    self.window_size = window_size;
    LazyEvent::Fetch(FetchCommand {
      request_id: self.request_id,
      intent,
      request: FetchRequest {
        window_start: max(window_start, 0),
        window_size,
        cursor_intent: intent,
      },
      fetcher: Arc::clone(&self.fetcher),
    })
  }

  /// 把响应并回状态
  /// Merge a response back into the state
  fn reconcile(&mut self, data: DataMsg<P>) -> LazyEvent<P> {
    if data.request_id != self.request_id {
      // 过期响应，整条丢弃
      // Stale response, dropped wholesale
      return LazyEvent::Idle;
    }
    self.loading = false;
    let res = match data.result {
      Ok(res) => res,
      Err(e) => return LazyEvent::Failed(e),
    };
    if res.total < 0 || res.window_start < 0 {
      return LazyEvent::Failed(Error::invariant(format!(
        "fetch returned negative bounds: total={} window_start={}",
        res.total, res.window_start
      )));
    }

    let prev_absolute = self.absolute_cursor();
    let max_start = max(res.total - self.window_size, 0);
    self.window_start = res.window_start.clamp(0, max_start);
    self.total = res.total;
    self.payload = Some(res.payload);
    self.table.set_rows(res.rows);

    if self.table.is_empty() {
      self.table.set_cursor(0);
      return LazyEvent::Idle;
    }
    let last = self.table.len() as i64 - 1;
    let cursor = match data.intent {
      CursorIntent::Start => 0,
      CursorIntent::End => last,
      CursorIntent::Keep => (prev_absolute - self.window_start).clamp(0, last),
    };
    self.table.set_cursor(cursor as usize);
    LazyEvent::Idle
  }

  fn handle_key(&mut self, key: KeyEvent) -> LazyEvent<P> {
    if self.total == 0 && self.table.is_empty() {
      return LazyEvent::Idle;
    }
    match key.code {
      KeyCode::Up | KeyCode::Char('k') => {
        self.table.move_cursor(-1);
        self.maybe_prefetch()
      }
      KeyCode::Down | KeyCode::Char('j') => {
        self.table.move_cursor(1);
        self.maybe_prefetch()
      }
      KeyCode::PageUp => self.move_page(-1),
      KeyCode::PageDown => self.move_page(1),
      KeyCode::Char('g') | KeyCode::Home => {
        if self.window_start == 0 {
          self.table.set_cursor(0);
          LazyEvent::Idle
        } else {
          self.request_window(0, CursorIntent::Start)
        }
      }
      KeyCode::Char('G') | KeyCode::End => {
        let target = max(self.total - self.window_size, 0);
        if self.window_start + self.table.len() as i64 >= self.total {
          let last = self.table.len().saturating_sub(1);
          self.table.set_cursor(last);
          LazyEvent::Idle
        } else {
          self.request_window(target, CursorIntent::End)
        }
      }
      _ => LazyEvent::Idle,
    }
  }

  /// 按整页移动游标；自定义键位的宿主可直接调用
  /// Move the cursor by whole pages; hosts with custom key maps call this directly
  pub fn move_page(&mut self, delta: i64) -> LazyEvent<P> {
    if self.table.is_empty() {
      return LazyEvent::Idle;
    }
    self.table.move_cursor(delta * self.page_rows());
    self.maybe_prefetch()
  }

  fn page_rows(&self) -> i64 {
    if self.table.height() > 0 {
      self.table.height() as i64
    } else {
      self.fallback_page_size
    }
  }

  /// 游标逼近窗口边缘时把窗口滑动一个视口
  /// Slide the window by one viewport when the cursor nears the window edge
  fn maybe_prefetch(&mut self) -> LazyEvent<P> {
    if self.loading {
      return LazyEvent::Idle;
    }
    let rows = self.table.len() as i64;
    let h = self.page_rows();
    let cursor = self.table.cursor() as i64;
    if cursor >= rows - h && self.window_start + rows < self.total {
      return self.request_window(self.window_start + h, CursorIntent::Keep);
    }
    if cursor < h && self.window_start > 0 {
      return self.request_window(max(self.window_start - h, 0), CursorIntent::Keep);
    }
    LazyEvent::Idle
  }
}
