//! Redis 配置和连接管理模块
//! Redis configuration and connection management module
//!
//! 连接包装器同时承载开发追踪器的命令拦截钩子
//! The connection wrapper also carries the dev tracker's command interception hook

use crate::error::Result;
use crate::tracker::{DevTracker, LogKind};
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{Arg, Cmd, ConnectionInfo, IntoConnectionInfo, Pipeline, RedisFuture, Value};
use std::sync::Arc;
use std::time::Instant;

/// 渲染命令时单个参数的最大长度
/// Maximum length of a single rendered argument
const MAX_RENDERED_ARG: usize = 120;

/// Redis 连接配置
/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
  info: ConnectionInfo,
}

impl RedisConfig {
  /// 从 URL 创建配置
  /// Create a configuration from a URL
  pub fn from_url<T: IntoConnectionInfo>(url: T) -> Result<Self> {
    Ok(Self {
      info: url.into_connection_info()?,
    })
  }

  /// 建立多路复用连接
  /// Establish a multiplexed connection
  pub async fn connect(&self) -> Result<MultiplexedConnection> {
    let client = redis::Client::open(self.info.clone())?;
    Ok(client.get_multiplexed_async_connection().await?)
  }
}

/// 仪表盘使用的 Redis 连接
/// The Redis connection the dashboard uses
///
/// 追踪变体把每条命令记入开发追踪器；未启用追踪时是纯透传
/// The tracked variant records every command into the dev tracker; plain is a pure pass-through
#[derive(Clone)]
pub enum DashConnection {
  /// 直连
  /// Direct connection
  Plain(MultiplexedConnection),
  /// 带命令记录的连接
  /// Connection with command recording
  Tracked(TrackedConnection),
  /// 按脚本回放应答的连接，测试专用
  /// Connection replaying scripted replies, tests only
  #[cfg(test)]
  Scripted(ScriptedConnection),
}

impl DashConnection {
  /// 根据是否提供追踪器选择变体
  /// Pick the variant based on whether a tracker is supplied
  pub fn new(conn: MultiplexedConnection, tracker: Option<Arc<DevTracker>>) -> Self {
    match tracker {
      Some(tracker) => Self::Tracked(TrackedConnection { inner: conn, tracker }),
      None => Self::Plain(conn),
    }
  }
}

impl ConnectionLike for DashConnection {
  fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
    match self {
      Self::Plain(conn) => conn.req_packed_command(cmd),
      Self::Tracked(conn) => conn.req_packed_command(cmd),
      #[cfg(test)]
      Self::Scripted(conn) => conn.req_packed_command(cmd),
    }
  }

  fn req_packed_commands<'a>(
    &'a mut self,
    pipeline: &'a Pipeline,
    offset: usize,
    count: usize,
  ) -> RedisFuture<'a, Vec<Value>> {
    match self {
      Self::Plain(conn) => conn.req_packed_commands(pipeline, offset, count),
      Self::Tracked(conn) => conn.req_packed_commands(pipeline, offset, count),
      #[cfg(test)]
      Self::Scripted(conn) => conn.req_packed_commands(pipeline, offset, count),
    }
  }

  fn get_db(&self) -> i64 {
    match self {
      Self::Plain(conn) => conn.get_db(),
      Self::Tracked(conn) => conn.inner.get_db(),
      #[cfg(test)]
      Self::Scripted(_) => 0,
    }
  }
}

/// 记录每条命令及其耗时的连接包装
/// Connection wrapper recording each command and its duration
#[derive(Clone)]
pub struct TrackedConnection {
  inner: MultiplexedConnection,
  tracker: Arc<DevTracker>,
}

impl ConnectionLike for TrackedConnection {
  fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
    let rendered = render_cmd(cmd);
    Box::pin(async move {
      let started = Instant::now();
      let result = self.inner.req_packed_command(cmd).await;
      self
        .tracker
        .append_log(LogKind::Command, rendered, Some(started.elapsed()));
      self
        .tracker
        .append_log(LogKind::Result, summarize(&result), None);
      result
    })
  }

  fn req_packed_commands<'a>(
    &'a mut self,
    pipeline: &'a Pipeline,
    offset: usize,
    count: usize,
  ) -> RedisFuture<'a, Vec<Value>> {
    let rendered = render_pipeline(pipeline);
    Box::pin(async move {
      self.tracker.append_log(LogKind::PipelineBegin, rendered, None);
      let started = Instant::now();
      let result = self.inner.req_packed_commands(pipeline, offset, count).await;
      self.tracker.append_log(
        LogKind::PipelineExec,
        format!("{count} commands"),
        Some(started.elapsed()),
      );
      self
        .tracker
        .append_log(LogKind::Result, summarize_batch(&result), None);
      result
    })
  }

  fn get_db(&self) -> i64 {
    self.inner.get_db()
  }
}

/// 按入队顺序回放固定应答，不碰网络
/// Replays canned replies in queue order without touching the network
#[cfg(test)]
#[derive(Clone, Default)]
pub struct ScriptedConnection {
  replies: Arc<std::sync::Mutex<std::collections::VecDeque<Value>>>,
  issued: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl ScriptedConnection {
  pub fn new(replies: Vec<Value>) -> Self {
    Self {
      replies: Arc::new(std::sync::Mutex::new(replies.into_iter().collect())),
      issued: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
    }
  }

  /// 目前为止发出的往返次数，单条命令和管道各算一次
  /// Round trips issued so far; a single command and a pipeline each count once
  pub fn issued(&self) -> usize {
    self.issued.load(std::sync::atomic::Ordering::SeqCst)
  }

  fn pop(&self) -> Value {
    let mut replies = self.replies.lock().unwrap();
    replies.pop_front().unwrap_or(Value::Nil)
  }
}

#[cfg(test)]
impl ConnectionLike for ScriptedConnection {
  fn req_packed_command<'a>(&'a mut self, _cmd: &'a Cmd) -> RedisFuture<'a, Value> {
    self.issued.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let reply = self.pop();
    Box::pin(async move { Ok(reply) })
  }

  fn req_packed_commands<'a>(
    &'a mut self,
    _pipeline: &'a Pipeline,
    _offset: usize,
    count: usize,
  ) -> RedisFuture<'a, Vec<Value>> {
    self.issued.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    let replies: Vec<Value> = (0..count).map(|_| self.pop()).collect();
    Box::pin(async move { Ok(replies) })
  }

  fn get_db(&self) -> i64 {
    0
  }
}

fn render_cmd(cmd: &Cmd) -> String {
  let mut parts = Vec::new();
  for arg in cmd.args_iter() {
    match arg {
      Arg::Simple(bytes) => {
        let mut text = String::from_utf8_lossy(bytes).into_owned();
        if text.len() > MAX_RENDERED_ARG {
          // 多字节参数不能切在字符中间
          // Multibyte args must not be cut mid-character
          let mut cut = MAX_RENDERED_ARG;
          while !text.is_char_boundary(cut) {
            cut -= 1;
          }
          text.truncate(cut);
          text.push('…');
        }
        parts.push(text);
      }
      Arg::Cursor => parts.push("<cursor>".to_string()),
    }
  }
  parts.join(" ")
}

fn render_pipeline(pipeline: &Pipeline) -> String {
  pipeline
    .cmd_iter()
    .map(render_cmd)
    .collect::<Vec<_>>()
    .join("; ")
}

fn summarize(result: &redis::RedisResult<Value>) -> String {
  match result {
    Ok(value) => format!("ok: {}", value_shape(value)),
    Err(err) => format!("err: {err}"),
  }
}

fn summarize_batch(result: &redis::RedisResult<Vec<Value>>) -> String {
  match result {
    Ok(values) => format!("ok: {} replies", values.len()),
    Err(err) => format!("err: {err}"),
  }
}

fn value_shape(value: &Value) -> String {
  match value {
    Value::Nil => "nil".to_string(),
    Value::Int(n) => n.to_string(),
    Value::Array(items) => format!("array[{}]", items.len()),
    Value::Map(entries) => format!("map[{}]", entries.len()),
    Value::BulkString(bytes) => format!("bulk({}b)", bytes.len()),
    other => format!("{other:?}").chars().take(40).collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_cmd() {
    let mut cmd = Cmd::new();
    cmd.arg("ZRANGE").arg("retry").arg(0).arg(29);
    assert_eq!(render_cmd(&cmd), "ZRANGE retry 0 29");
  }

  #[test]
  fn test_render_cmd_truncates_long_args() {
    let mut cmd = Cmd::new();
    cmd.arg("LPUSH").arg("queue:default").arg("x".repeat(500));
    let rendered = render_cmd(&cmd);
    assert!(rendered.len() < 200);
    assert!(rendered.ends_with('…'));
  }

  #[test]
  fn test_render_cmd_truncates_multibyte_args_on_char_boundary() {
    // 截断点落在多字节字符中间时要退回到边界
    // When the cut lands mid-character it must back up to the boundary
    let mut cmd = Cmd::new();
    cmd.arg("ZADD").arg("dead").arg(format!("a{}", "好".repeat(50)));
    let rendered = render_cmd(&cmd);
    assert!(rendered.ends_with('…'));
    assert!(rendered.len() <= "ZADD dead ".len() + MAX_RENDERED_ARG + '…'.len_utf8());
  }

  #[test]
  fn test_render_pipeline() {
    let mut pipe = redis::pipe();
    pipe.cmd("LLEN").arg("queue:default");
    pipe.cmd("LLEN").arg("queue:low");
    assert_eq!(
      render_pipeline(&pipe),
      "LLEN queue:default; LLEN queue:low"
    );
  }

  #[test]
  fn test_value_shapes() {
    assert_eq!(value_shape(&Value::Nil), "nil");
    assert_eq!(value_shape(&Value::Int(7)), "7");
    assert_eq!(value_shape(&Value::Array(vec![Value::Nil])), "array[1]");
  }
}
