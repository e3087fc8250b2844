//! 确认流程测试：武装、拒绝、恰好一次交付
//! Confirmation flow tests: arming, refusal, exactly-once delivery

use sidekiq_tui::base::keys::SortedSetKind;
use sidekiq_tui::confirm::{ConfirmState, DangerousAction};
use sidekiq_tui::message::{Dialog, Msg};

fn retry_all() -> DangerousAction {
  DangerousAction::RetryAll(SortedSetKind::Retry)
}

#[test]
fn test_request_opens_dialog_and_arms_state() {
  let mut state = ConfirmState::new(true);
  let msg = state.request(retry_all(), "Retry all retry jobs?", "retry-all");
  match msg {
    Some(Msg::OpenDialog(Dialog::Confirm { prompt, target })) => {
      assert_eq!(prompt, "Retry all retry jobs?");
      assert_eq!(target, "retry-all");
    }
    other => panic!("expected a confirm dialog, got {other:?}"),
  }
  assert!(state.is_pending());
}

#[test]
fn test_no_clears_without_io() {
  let mut state = ConfirmState::new(true);
  state.request(retry_all(), "Retry all retry jobs?", "retry-all");

  assert_eq!(state.resolve(false, "retry-all"), None);
  assert!(!state.is_pending());
  // 清空之后再点 Yes 也不会有动作
  // A Yes after the state was cleared yields nothing
  assert_eq!(state.resolve(true, "retry-all"), None);
}

#[test]
fn test_yes_fires_exactly_once() {
  let mut state = ConfirmState::new(true);
  state.request(retry_all(), "Retry all retry jobs?", "retry-all");

  assert_eq!(state.resolve(true, "retry-all"), Some(retry_all()));
  assert!(!state.is_pending());
  assert_eq!(state.resolve(true, "retry-all"), None);
}

#[test]
fn test_mismatched_target_is_ignored() {
  let mut state = ConfirmState::new(true);
  state.request(
    DangerousAction::ClearQueue {
      name: "default".to_string(),
    },
    "Clear queue default?",
    "queue:default",
  );

  // 目标不一致的 Yes 被忽略，待定操作保留
  // A Yes for a different target is ignored and the pending action survives
  assert_eq!(state.resolve(true, "queue:critical"), None);
  assert!(state.is_pending());
  assert!(state.resolve(true, "queue:default").is_some());
}

#[test]
fn test_disabled_never_arms() {
  let mut state = ConfirmState::new(false);
  assert!(state
    .request(retry_all(), "Retry all retry jobs?", "retry-all")
    .is_none());
  assert!(!state.is_pending());
  assert_eq!(state.resolve(true, "retry-all"), None);
}

#[test]
fn test_new_request_replaces_pending() {
  let mut state = ConfirmState::new(true);
  state.request(retry_all(), "Retry all retry jobs?", "retry-all");
  state.request(
    DangerousAction::DeleteAll(SortedSetKind::Dead),
    "Delete all dead jobs?",
    "dead-all",
  );

  // 旧目标失效，只有新目标能放行
  // The old target is void; only the new one resolves
  assert_eq!(state.resolve(true, "retry-all"), None);
  assert_eq!(
    state.resolve(true, "dead-all"),
    Some(DangerousAction::DeleteAll(SortedSetKind::Dead))
  );
}
