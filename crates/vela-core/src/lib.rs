//! Configuration loading, secret vault, and executor bootstrap.

pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod vault;
