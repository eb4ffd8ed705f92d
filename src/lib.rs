#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod carousel;
pub mod config;
pub mod content;
pub mod data;
pub mod feed;
pub mod fragment;
pub mod news;
pub mod subscribe;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
