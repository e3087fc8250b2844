//! 懒加载表格的端到端测试：用内存数据源驱动完整的 命令 → 响应 循环
//! End-to-end tests for the lazy table, driving the full command → response loop
//! against an in-memory data source

use std::cmp::min;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::layout::Constraint;
use sidekiq_tui::error::Result;
use sidekiq_tui::table::lazy::{
  FetchRequest, FetchResult, Fetcher, LazyEvent, LazyMsg, LazyTable,
};
use sidekiq_tui::table::{Column, TableOptions};

/// 固定大小的内存数据集，按请求切窗口并统计取数次数
/// A fixed-size in-memory dataset that slices windows per request and counts fetches
struct MemoryFetcher {
  total: i64,
  fetches: AtomicUsize,
}

impl MemoryFetcher {
  fn new(total: i64) -> Arc<Self> {
    Arc::new(Self {
      total,
      fetches: AtomicUsize::new(0),
    })
  }

  fn fetch_count(&self) -> usize {
    self.fetches.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Fetcher<Vec<i64>> for MemoryFetcher {
  async fn fetch(&self, req: FetchRequest) -> Result<FetchResult<Vec<i64>>> {
    self.fetches.fetch_add(1, Ordering::SeqCst);
    let start = req.window_start.clamp(0, self.total);
    let end = min(start + req.window_size, self.total);
    let ids: Vec<i64> = (start..end).collect();
    Ok(FetchResult {
      rows: ids.iter().map(|i| vec![format!("jid-{i}")]).collect(),
      total: self.total,
      window_start: start,
      payload: ids,
    })
  }
}

fn lazy(fetcher: Arc<MemoryFetcher>) -> LazyTable<Vec<i64>> {
  let mut lazy = LazyTable::new(
    TableOptions::new(vec![Column::new("JID", Constraint::Min(10))], "No jobs found"),
    fetcher,
    3,
    25,
  );
  lazy.update(LazyMsg::<Vec<i64>>::Resize { height: 10 });
  lazy
}

/// 执行产出的取数命令并把响应回灌
/// Run the yielded fetch command and feed the response back
async fn drive(lazy: &mut LazyTable<Vec<i64>>, event: LazyEvent<Vec<i64>>) {
  match event {
    LazyEvent::Fetch(cmd) => {
      let msg = cmd.run().await;
      match lazy.update(LazyMsg::Data(msg)) {
        LazyEvent::Idle => {}
        LazyEvent::Failed(e) => panic!("fetch failed: {e}"),
        LazyEvent::Fetch(_) => panic!("reconcile must not fetch"),
      }
    }
    LazyEvent::Idle => {}
    LazyEvent::Failed(e) => panic!("fetch failed: {e}"),
  }
}

#[tokio::test]
async fn test_fresh_load_fills_one_window() {
  let fetcher = MemoryFetcher::new(120);
  let mut lazy = lazy(Arc::clone(&fetcher));

  let event = lazy.first_fetch();
  drive(&mut lazy, event).await;

  // 视口 10 行、三页窗口，只取前 30 行
  // Viewport of 10 rows and a three-page window: only the first 30 rows are held
  assert_eq!(lazy.table().len(), 30);
  assert_eq!(lazy.total(), 120);
  assert_eq!(lazy.range(), (1, 30, 120));
  assert_eq!(lazy.table().cursor(), 0);
  assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_edge_prefetch_slides_window_and_keeps_cursor() {
  let fetcher = MemoryFetcher::new(120);
  let mut lazy = lazy(Arc::clone(&fetcher));
  let event = lazy.first_fetch();
  drive(&mut lazy, event).await;

  // 走到窗口尾部触发预取
  // Walk to the bottom of the window to trigger a prefetch
  for _ in 0..29 {
    let event = lazy.update(LazyMsg::Key(KeyEvent::from(KeyCode::Down)));
    drive(&mut lazy, event).await;
  }

  // 窗口滑动而游标的绝对行号不变
  // The window slid while the cursor's absolute index stayed put
  assert_eq!(lazy.absolute_cursor(), 29);
  assert!(lazy.range().0 > 1);
  assert!(fetcher.fetch_count() > 1);
}

#[tokio::test]
async fn test_jump_to_end_and_back() {
  let fetcher = MemoryFetcher::new(120);
  let mut lazy = lazy(Arc::clone(&fetcher));
  let event = lazy.first_fetch();
  drive(&mut lazy, event).await;

  let event = lazy.update(LazyMsg::Key(KeyEvent::from(KeyCode::Char('G'))));
  drive(&mut lazy, event).await;
  assert_eq!(lazy.absolute_cursor(), 119);
  assert_eq!(lazy.range(), (91, 120, 120));

  let event = lazy.update(LazyMsg::Key(KeyEvent::from(KeyCode::Char('g'))));
  drive(&mut lazy, event).await;
  assert_eq!(lazy.absolute_cursor(), 0);
  assert_eq!(lazy.range(), (1, 30, 120));
}

#[tokio::test]
async fn test_move_page_pages_and_prefetches() {
  let fetcher = MemoryFetcher::new(120);
  let mut lazy = lazy(Arc::clone(&fetcher));
  let event = lazy.first_fetch();
  drive(&mut lazy, event).await;
  assert_eq!(lazy.window_start(), 0);

  // 第一页移动停在窗口内，不取数
  // The first page move stays inside the window, no fetch
  let event = lazy.move_page(1);
  assert!(matches!(event, LazyEvent::Idle));
  assert_eq!(lazy.absolute_cursor(), 10);

  // 第二页移动触到窗口尾部，窗口下滑一个视口
  // The second one hits the window edge and the window slides down one viewport
  let event = lazy.move_page(1);
  drive(&mut lazy, event).await;
  assert_eq!(lazy.absolute_cursor(), 20);
  assert_eq!(lazy.window_start(), 10);

  let id_before = lazy.request_id();
  let event = lazy.move_page(-1);
  drive(&mut lazy, event).await;
  assert_eq!(lazy.absolute_cursor(), 10);
  assert_eq!(lazy.window_start(), 0);
  // 上滑发过请求，请求号前进
  // The upward slide issued a request, the id advanced
  assert!(lazy.request_id() > id_before);
}

#[tokio::test]
async fn test_empty_dataset_ignores_navigation() {
  let fetcher = MemoryFetcher::new(0);
  let mut lazy = lazy(Arc::clone(&fetcher));
  let event = lazy.first_fetch();
  drive(&mut lazy, event).await;

  assert_eq!(lazy.range(), (0, 0, 0));
  for code in [KeyCode::Down, KeyCode::Up, KeyCode::Char('G'), KeyCode::PageDown] {
    let event = lazy.update(LazyMsg::Key(KeyEvent::from(code)));
    assert!(matches!(event, LazyEvent::Idle));
  }
  assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_reset_invalidates_in_flight_response() {
  let fetcher = MemoryFetcher::new(120);
  let mut lazy = lazy(Arc::clone(&fetcher));

  let cmd = match lazy.first_fetch() {
    LazyEvent::Fetch(cmd) => cmd,
    _ => panic!("expected a fetch command"),
  };
  let msg = cmd.run().await;
  // 响应落地前重置，响应必须被丢弃
  // Reset before the response lands; the response must be discarded
  lazy.reset();
  assert!(matches!(lazy.update(LazyMsg::Data(msg)), LazyEvent::Idle));
  assert!(lazy.table().is_empty());
  assert_eq!(lazy.total(), 0);
}

#[tokio::test]
async fn test_refresh_keeps_position() {
  let fetcher = MemoryFetcher::new(120);
  let mut lazy = lazy(Arc::clone(&fetcher));
  let event = lazy.first_fetch();
  drive(&mut lazy, event).await;
  lazy.table_mut().set_cursor(12);

  let event = lazy.update(LazyMsg::<Vec<i64>>::Refresh);
  drive(&mut lazy, event).await;
  assert_eq!(lazy.absolute_cursor(), 12);
  assert_eq!(lazy.range(), (1, 30, 120));
}
