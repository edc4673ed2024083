//! Inkwell — library crate for integration testing.
//!
//! Re-exports modules needed by integration tests in `tests/`.

pub mod auth;
pub mod authz;
pub mod blogs;
pub mod cache;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod store;
