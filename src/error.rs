//! 错误处理模块
//! Error handling module
//!
//! 定义仪表盘核心使用的各种错误类型
//! Defines the error types used by the dashboard core

use thiserror::Error;

/// 仪表盘核心的结果类型
/// Result type for the dashboard core
pub type Result<T> = std::result::Result<T, Error>;

/// 仪表盘错误类型
/// Dashboard error type
#[derive(Error, Debug)]
pub enum Error {
  /// Redis connection error
  #[error("Redis connection error: {0}")]
  Redis(#[from] redis::RedisError),

  /// Redis 响应结构不符合预期
  /// Redis response had an unexpected shape
  #[error("Invalid Redis response: {message}")]
  InvalidResponse { message: String },

  /// 任务信封解码错误
  /// Job envelope decode error
  #[error("Envelope decode error: {0}")]
  Decode(#[from] serde_json::Error),

  /// 信封缺少必需字段或格式错误
  /// Envelope missing a required field or malformed
  #[error("Malformed envelope: {message}")]
  MalformedEnvelope { message: String },

  /// 目标条目不存在
  /// Target entry not found
  #[error("Not found: {what}")]
  NotFound { what: String },

  /// 响应违反了窗口不变量（负大小、越界窗口等）
  /// Response violated a window invariant (negative size, out-of-range window, ...)
  #[error("Invariant violation: {message}")]
  InvariantViolation { message: String },

  /// 用户取消了确认对话框
  /// User cancelled a confirmation dialog
  #[error("Cancelled by user")]
  UserCancel,

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },

  /// IO 错误
  /// IO error
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  /// 其他错误
  /// Other error
  #[error("Other error: {message}")]
  Other { message: String },
}

impl Error {
  /// 创建无效响应错误
  /// Create an invalid response error
  pub fn invalid_response<S: Into<String>>(message: S) -> Self {
    Self::InvalidResponse {
      message: message.into(),
    }
  }

  /// 创建格式错误的信封错误
  /// Create a malformed envelope error
  pub fn malformed_envelope<S: Into<String>>(message: S) -> Self {
    Self::MalformedEnvelope {
      message: message.into(),
    }
  }

  /// 创建未找到错误
  /// Create a not found error
  pub fn not_found<S: Into<String>>(what: S) -> Self {
    Self::NotFound { what: what.into() }
  }

  /// 创建不变量违规错误
  /// Create an invariant violation error
  pub fn invariant<S: Into<String>>(message: S) -> Self {
    Self::InvariantViolation {
      message: message.into(),
    }
  }

  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// 创建其他错误
  /// Create another type of error
  pub fn other<S: Into<String>>(message: S) -> Self {
    Self::Other {
      message: message.into(),
    }
  }

  /// 是否为传输层失败（连接错误覆盖层的触发条件）
  /// Whether this is a transport failure (triggers the connection-error overlay)
  ///
  /// 不变量违规按传输失败处理
  /// Invariant violations are treated as transport failures
  pub fn is_transport(&self) -> bool {
    matches!(
      self,
      Error::Redis(_) | Error::InvalidResponse { .. } | Error::InvariantViolation { .. } | Error::Io(_)
    )
  }

  /// 是否为解码失败（聚合时跳过相应条目）
  /// Whether this is a decode failure (the offending entry is skipped in aggregates)
  pub fn is_decode(&self) -> bool {
    matches!(self, Error::Decode(_) | Error::MalformedEnvelope { .. })
  }

  /// 是否为未找到（针对性变更视为已满足操作者意图）
  /// Whether this is not-found (targeted mutations treat it as intent already satisfied)
  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound { .. })
  }
}
