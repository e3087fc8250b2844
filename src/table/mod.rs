//! 表格模块
//! Table module
//!
//! 懒加载核心内嵌的游标表格；渲染交给宿主，这里只维护行、列与游标状态
//! The cursor table embedded in the lazy core; rendering belongs to the host, this keeps rows,
//! columns, and cursor state

use ratatui::layout::Constraint;
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Cell, Row, Table, TableState};

pub mod lazy;
pub mod window;

/// 一列
/// One column
#[derive(Debug, Clone)]
pub struct Column {
  pub title: String,
  pub width: Constraint,
}

impl Column {
  /// 创建列
  /// Create a column
  pub fn new(title: impl Into<String>, width: Constraint) -> Self {
    Self {
      title: title.into(),
      width,
    }
  }
}

/// 表格的透传选项：列集合与空数据提示
/// Pass-through table options: column set and empty message
#[derive(Debug, Clone)]
pub struct TableOptions {
  pub columns: Vec<Column>,
  pub empty_message: String,
}

impl TableOptions {
  /// 创建选项
  /// Create options
  pub fn new(columns: Vec<Column>, empty_message: impl Into<String>) -> Self {
    Self {
      columns,
      empty_message: empty_message.into(),
    }
  }
}

/// 内嵌表格：当前窗口的行 + 游标 + 视口高度
/// Embedded table: the current window's rows + cursor + viewport height
#[derive(Debug)]
pub struct JobTable {
  options: TableOptions,
  rows: Vec<Vec<String>>,
  state: TableState,
  /// 视口高度（行数）；0 表示尚未收到尺寸
  /// Viewport height in rows; 0 until a resize arrives
  height: u16,
}

impl JobTable {
  /// 创建空表
  /// Create an empty table
  pub fn new(options: TableOptions) -> Self {
    Self {
      options,
      rows: Vec::new(),
      state: TableState::default().with_selected(0),
      height: 0,
    }
  }

  /// 当前窗口的行
  /// Rows of the current window
  pub fn rows(&self) -> &[Vec<String>] {
    &self.rows
  }

  /// 行数
  /// Row count
  pub fn len(&self) -> usize {
    self.rows.len()
  }

  /// 是否为空
  /// Whether there are no rows
  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  /// 替换行并把游标夹回有效范围
  /// Replace the rows and clamp the cursor back in range
  pub fn set_rows(&mut self, rows: Vec<Vec<String>>) {
    self.rows = rows;
    let cursor = self.cursor();
    self.set_cursor(cursor);
  }

  /// 游标：窗口内的 0 基行号
  /// Cursor: 0-based row index within the window
  pub fn cursor(&self) -> usize {
    self.state.selected().unwrap_or(0)
  }

  /// 设置游标，夹在 [0, len)
  /// Set the cursor, clamped to [0, len)
  pub fn set_cursor(&mut self, cursor: usize) {
    let max = self.rows.len().saturating_sub(1);
    self.state.select(Some(cursor.min(max)));
  }

  /// 相对移动游标
  /// Move the cursor relatively
  pub fn move_cursor(&mut self, delta: i64) {
    if self.rows.is_empty() {
      return;
    }
    let next = (self.cursor() as i64 + delta).clamp(0, self.rows.len() as i64 - 1);
    self.set_cursor(next as usize);
  }

  /// 视口高度
  /// Viewport height
  pub fn height(&self) -> u16 {
    self.height
  }

  /// 更新视口高度
  /// Update the viewport height
  pub fn set_height(&mut self, height: u16) {
    self.height = height;
  }

  /// 一页的行数；高度未知时为 0，由调用方回退
  /// Rows per page; 0 while the height is unknown, callers fall back
  pub fn page_size(&self) -> usize {
    self.height as usize
  }

  /// 空数据提示
  /// Empty message
  pub fn empty_message(&self) -> &str {
    &self.options.empty_message
  }

  /// 渲染状态，供宿主 `render_stateful_widget` 使用
  /// Render state for the host's `render_stateful_widget`
  pub fn state_mut(&mut self) -> &mut TableState {
    &mut self.state
  }

  /// 组装 ratatui 表格部件；空数据时只有提示行
  /// Assemble the ratatui table widget; just the empty-message row when there is no data
  pub fn widget(&self) -> Table<'_> {
    let header = Row::new(
      self
        .options
        .columns
        .iter()
        .map(|column| Cell::from(column.title.as_str())),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = if self.rows.is_empty() {
      vec![Row::new(vec![Cell::from(self.options.empty_message.as_str())])]
    } else {
      self
        .rows
        .iter()
        .map(|cells| Row::new(cells.iter().map(|cell| Cell::from(cell.as_str()))))
        .collect()
    };

    let widths: Vec<Constraint> = self.options.columns.iter().map(|c| c.width).collect();
    Table::new(rows, widths)
      .header(header)
      .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> JobTable {
    JobTable::new(TableOptions::new(
      vec![
        Column::new("JID", Constraint::Length(24)),
        Column::new("Class", Constraint::Min(10)),
      ],
      "No retries found",
    ))
  }

  fn rows(n: usize) -> Vec<Vec<String>> {
    (0..n)
      .map(|i| vec![format!("jid-{i}"), "HardJob".to_string()])
      .collect()
  }

  #[test]
  fn test_cursor_clamping() {
    let mut table = table();
    table.set_rows(rows(5));
    table.set_cursor(10);
    assert_eq!(table.cursor(), 4);

    table.move_cursor(-100);
    assert_eq!(table.cursor(), 0);
    table.move_cursor(3);
    assert_eq!(table.cursor(), 3);
  }

  #[test]
  fn test_set_rows_keeps_cursor_in_range() {
    let mut table = table();
    table.set_rows(rows(30));
    table.set_cursor(29);
    // 行变少后游标落到最后一行
    // After the rows shrink the cursor lands on the last row
    table.set_rows(rows(10));
    assert_eq!(table.cursor(), 9);
  }

  #[test]
  fn test_empty_table_navigation_is_noop() {
    let mut table = table();
    table.move_cursor(1);
    assert_eq!(table.cursor(), 0);
    assert!(table.is_empty());
    assert_eq!(table.empty_message(), "No retries found");
  }
}
