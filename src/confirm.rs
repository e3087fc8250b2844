//! 确认状态模块
//! Confirmation state module
//!
//! 危险操作的 (动作, 目标) 待定状态；任何终止转换都会清空它，防止意外双触发
//! The pending (action, target) state for dangerous actions; any terminal transition clears it
//! so an action can never fire twice

use crate::base::keys::SortedSetKind;
use crate::message::{Dialog, Msg};

/// 被确认门控的变更操作
/// Mutations gated behind confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum DangerousAction {
  /// 删除单个集合条目
  /// Delete a single set entry
  DeleteJob {
    kind: SortedSetKind,
    score: f64,
    member: String,
  },
  /// 立即重试单个集合条目
  /// Retry a single set entry now
  RetryJobNow {
    kind: SortedSetKind,
    score: f64,
    member: String,
  },
  /// 将重试条目移入死亡集合
  /// Move a retry entry to the dead set
  KillJob { score: f64, member: String },
  /// 清空整个集合
  /// Delete every entry of the set
  DeleteAll(SortedSetKind),
  /// 将集合全部条目推回队列
  /// Push every set entry back onto its queue
  RetryAll(SortedSetKind),
  /// 静默进程
  /// Quiet a process
  PauseProcess { identity: String },
  /// 停止进程
  /// Stop a process
  StopProcess { identity: String },
  /// 清空队列
  /// Clear a queue
  ClearQueue { name: String },
}

/// 确认状态机
/// Confirmation state machine
///
/// 危险操作未启用时 `request` 永远不武装状态，相应按键也不应出现在提示里
/// With dangerous actions disabled `request` never arms the state, and the key hints stay hidden
#[derive(Debug, Default)]
pub struct ConfirmState {
  enabled: bool,
  pending: Option<(DangerousAction, String)>,
}

impl ConfirmState {
  /// 创建；`enabled` 来自宿主的危险操作开关
  /// Create; `enabled` comes from the host's dangerous-actions flag
  pub fn new(enabled: bool) -> Self {
    Self {
      enabled,
      pending: None,
    }
  }

  /// 是否启用危险操作
  /// Whether dangerous actions are enabled
  pub fn enabled(&self) -> bool {
    self.enabled
  }

  /// 是否有待定操作
  /// Whether an action is pending
  pub fn is_pending(&self) -> bool {
    self.pending.is_some()
  }

  /// 武装一个待定操作并返回要打开的确认框
  /// Arm a pending action and return the confirm dialog to open
  pub fn request(
    &mut self,
    action: DangerousAction,
    prompt: impl Into<String>,
    target: impl Into<String>,
  ) -> Option<Msg> {
    if !self.enabled {
      return None;
    }
    let target = target.into();
    self.pending = Some((action, target.clone()));
    Some(Msg::OpenDialog(Dialog::Confirm {
      prompt: prompt.into(),
      target,
    }))
  }

  /// 处理确认结果
  /// Resolve a confirmation result
  ///
  /// No 清空状态且不做 I/O；Yes 仅在目标与待定操作一致时恰好交回一次动作，
  /// 目标不匹配时忽略且待定操作保留
  /// No clears the state with no I/O; Yes hands the action back exactly once only when the
  /// target matches; a mismatched Yes is ignored and the pending action persists
  pub fn resolve(&mut self, accepted: bool, target: &str) -> Option<DangerousAction> {
    if !accepted {
      self.pending = None;
      return None;
    }
    match &self.pending {
      Some((_, pending_target)) if pending_target == target => {
        self.pending.take().map(|(action, _)| action)
      }
      _ => None,
    }
  }

  /// 无条件清空
  /// Clear unconditionally
  pub fn clear(&mut self) {
    self.pending = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn delete_action() -> DangerousAction {
    DangerousAction::DeleteJob {
      kind: SortedSetKind::Dead,
      score: 123.0,
      member: "{}".to_string(),
    }
  }

  #[test]
  fn test_disabled_never_arms() {
    let mut state = ConfirmState::new(false);
    assert!(state.request(delete_action(), "Delete?", "jid-1").is_none());
    assert!(!state.is_pending());
    assert!(state.resolve(true, "jid-1").is_none());
  }

  #[test]
  fn test_yes_fires_exactly_once() {
    let mut state = ConfirmState::new(true);
    let msg = state.request(delete_action(), "Delete?", "jid-1");
    assert!(matches!(msg, Some(Msg::OpenDialog(Dialog::Confirm { .. }))));

    assert_eq!(state.resolve(true, "jid-1"), Some(delete_action()));
    // 第二次 Yes 不再有待定操作
    // A second Yes finds nothing pending
    assert!(state.resolve(true, "jid-1").is_none());
  }

  #[test]
  fn test_mismatched_target_is_ignored() {
    let mut state = ConfirmState::new(true);
    state.request(delete_action(), "Delete?", "jid-1");
    // 目标不匹配：忽略，待定操作保留
    // Mismatched target: ignored, the pending action persists
    assert!(state.resolve(true, "other").is_none());
    assert!(state.is_pending());
    assert_eq!(state.resolve(true, "jid-1"), Some(delete_action()));
  }

  #[test]
  fn test_no_then_yes_runs_once() {
    let mut state = ConfirmState::new(true);
    state.request(delete_action(), "Delete?", "jid-1");
    assert!(state.resolve(false, "jid-1").is_none());
    assert!(!state.is_pending());

    // 重新请求后 Yes 恰好执行一次
    // After re-requesting, Yes fires exactly once
    state.request(delete_action(), "Delete?", "jid-1");
    assert_eq!(state.resolve(true, "jid-1"), Some(delete_action()));
    assert!(!state.is_pending());
  }
}
