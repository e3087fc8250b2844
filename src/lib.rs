//! sidekiq-tui
//!
//! Sidekiq 终端面板的核心库：基于 Redis 的数据门面、懒加载窗口表格、
//! 错误汇总、指标直方图与开发者命令追踪
//! Core library for a Sidekiq terminal dashboard: a Redis-backed data facade, lazily
//! windowed tables, error summaries, metrics histograms, and a developer command tracker

pub mod base;
pub mod config;
pub mod confirm;
pub mod error;
pub mod histogram;
pub mod job;
pub mod message;
pub mod rdb;
pub mod redis;
pub mod summary;
pub mod table;
pub mod tracker;
pub mod view;

pub use crate::base::keys::SortedSetKind;
pub use crate::base::Facade;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::rdb::SidekiqClient;
