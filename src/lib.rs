//! Polizza: an insurance portfolio document store fronted by a
//! cache-aside query layer with write-path invalidation.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod ranking;
pub mod util;
