//! 消息模块
//! Message module
//!
//! 宿主消息循环与视图之间流动的消息种类
//! Message kinds flowing between the host message loop and views
//!
//! 所有可变状态都在循环线程上按消息到达顺序变更；命令在循环外执行并以消息交回结果
//! All mutable state changes on the loop thread in arrival order; commands run off the loop
//! and hand results back as messages

use crate::base::MetricsPeriod;
use crate::job::SortedEntry;
use crate::summary::ErrorSummaryRow;
use crossterm::event::KeyEvent;

/// 可打开的对话框
/// Dialogs the host can open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
  /// 过滤输入框，预填当前查询
  /// Filter input, pre-filled with the current query
  Filter { current: String },
  /// 确认框；`target` 是与待定操作比对的不透明字符串
  /// Confirmation; `target` is the opaque string matched against the pending action
  Confirm { prompt: String, target: String },
}

/// 宿主消息
/// Host messages
///
/// 前五种由宿主发给视图，其余由视图发给宿主
/// The first five flow host → view, the rest view → host
#[derive(Debug, Clone)]
pub enum Msg {
  /// 周期刷新节拍
  /// Periodic refresh tick
  Refresh,
  /// 终端尺寸变化
  /// Terminal resize
  Resize { width: u16, height: u16 },
  /// 按键
  /// Key press
  Key(KeyEvent),
  /// 过滤对话框的结果
  /// Filter dialog result
  FilterApplied(String),
  /// 确认对话框的结果
  /// Confirm dialog result
  ConfirmResult { accepted: bool, target: String },

  /// 连接错误覆盖层
  /// Connection error overlay
  ConnectionError(String),
  /// 打开对话框
  /// Open a dialog
  OpenDialog(Dialog),
  /// 打开任务详情
  /// Open job detail
  ShowJobDetail(Box<SortedEntry>),
  /// 打开错误汇总详情
  /// Open error summary detail
  ShowErrorDetails(Box<ErrorSummaryRow>),
  /// 打开某任务类的指标详情
  /// Open metrics detail for a class
  ShowJobMetrics { class: String, period: MetricsPeriod },
  /// 打开队列详情
  /// Open queue detail
  ShowQueueDetails { queue: String },
  /// 写入剪贴板
  /// Write to the clipboard
  CopyText(String),
}
