//! Sobes admin back office
//!
//! Generic filtered-query repositories over the quiz platform's entities,
//! and the services that add caching, password hashing and balance rules
//! on top of them.

pub mod config;
pub mod db;
pub mod orm;
pub mod services;

pub use config::Config;
pub use db::{Database, Session};
