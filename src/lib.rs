pub mod app;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod drive;
pub mod error;
pub mod fs_util;
pub mod layout;
pub mod materialize;
pub mod output;
pub mod resolver;
pub mod tui;
pub mod worker;
