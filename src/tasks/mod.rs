//! Background Tasks Module
//!
//! Tasks a ready context runs for the rest of its lifetime.
//!
//! # Tasks
//! - Change listener: reconciles on every remote notification
//! - Poll: re-reads the watermark at a fixed interval as a fallback

mod listener;
mod poll;

use std::sync::Arc;

pub use listener::spawn_listener_task;
pub use poll::{poll_once, spawn_poll_task};

/// Application callback run after a remote change was reconciled
pub type Invalidate = Arc<dyn Fn() + Send + Sync>;
