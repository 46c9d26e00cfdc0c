#![forbid(unsafe_code)]

pub mod browse;
pub mod cli;
pub mod config;
pub mod download;
pub mod feed;
pub mod fetch;
pub mod formats;
pub mod link;
pub mod logging;
pub mod navigation;
pub mod proxy;
pub mod session;
pub mod summary;
pub mod view;
