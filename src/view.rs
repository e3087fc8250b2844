//! 视图契约模块
//! View contract module
//!
//! 每个面板实现的小接口，让宿主组合上下文头、按键提示与帮助，
//! 懒加载表因此能不加改动地嵌入各种屏幕
//! Small interfaces each panel implements so the host can compose context headers, key hints,
//! and help, letting the lazy table drop into heterogeneous screens unchanged

/// 一条按键提示
/// One key hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hint {
  /// 按键标签，如 `J/K`、`Shift+D`
  /// Key label such as `J/K` or `Shift+D`
  pub key: String,
  /// 动作描述
  /// Action description
  pub action: String,
  /// 是否为危险操作的提示；未启用危险操作时不渲染
  /// Whether this hints a dangerous action; hidden while dangerous actions are disabled
  pub dangerous: bool,
}

impl Hint {
  /// 普通提示
  /// A plain hint
  pub fn new(key: impl Into<String>, action: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      action: action.into(),
      dangerous: false,
    }
  }

  /// 危险操作提示
  /// A dangerous-action hint
  pub fn dangerous(key: impl Into<String>, action: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      action: action.into(),
      dangerous: true,
    }
  }
}

/// 帮助覆盖层的一节
/// One section of the help overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpSection {
  pub title: String,
  pub hints: Vec<Hint>,
}

/// 面板提供的上下文头行（如 `retries · 120 jobs · oldest 2h ago`）
/// Context header line a panel provides (like `retries · 120 jobs · oldest 2h ago`)
pub trait ContextInfo {
  fn context_line(&self) -> Option<String>;
}

/// 面板的按键提示
/// A panel's key hints
pub trait KeyHints {
  fn key_hints(&self) -> Vec<Hint>;
}

/// 面板的帮助节
/// A panel's help sections
pub trait HelpSections {
  fn help_sections(&self) -> Vec<HelpSection>;
}

/// 嵌入懒加载表的面板追加的表格帮助
/// Extra table help for panels embedding the lazy table
pub trait TableHelp {
  fn table_help(&self) -> Vec<Hint>;
}

/// 按危险操作开关过滤提示
/// Filter hints by the dangerous-actions flag
pub fn visible_hints(hints: &[Hint], dangerous_enabled: bool) -> Vec<Hint> {
  hints
    .iter()
    .filter(|hint| dangerous_enabled || !hint.dangerous)
    .cloned()
    .collect()
}

/// 懒加载表通用的导航提示
/// Common navigation hints for the lazy table
pub fn table_navigation_hints() -> Vec<Hint> {
  vec![
    Hint::new("j/k", "move"),
    Hint::new("PgUp/PgDn", "page"),
    Hint::new("g/G", "top/bottom"),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_visible_hints_gating() {
    let hints = vec![
      Hint::new("enter", "details"),
      Hint::dangerous("D", "delete"),
      Hint::dangerous("R", "retry now"),
    ];
    let visible = visible_hints(&hints, false);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].key, "enter");

    let all = visible_hints(&hints, true);
    assert_eq!(all.len(), 3);
  }

  #[test]
  fn test_navigation_hints_are_not_dangerous() {
    assert!(table_navigation_hints().iter().all(|hint| !hint.dangerous));
  }
}
