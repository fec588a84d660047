#![allow(clippy::uninlined_format_args)]

pub mod admin;
pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod feed;
pub mod follow;
pub mod interaction;
pub mod models;
pub mod notice;
pub mod pager;
pub mod player;
pub mod present;
pub mod session;
pub mod storage;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
pub use error::ClientError;
