#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod checker;
pub mod config;
pub mod feed;
pub mod notify;
pub mod playback;
pub mod schedule;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
