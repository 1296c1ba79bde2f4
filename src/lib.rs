//! Venueboard library
//!
//! Token lifecycle, response cache, booking API client and HTML views, exposed for
//! the binary and for integration tests.

pub mod auth;
pub mod cache;
pub mod cli;
pub mod data;
pub mod refresh;
pub mod server;
pub mod views;

#[cfg(test)]
mod test_support;
