//! Middleware components for the HTTP server

pub mod auth;
pub mod cors;
pub mod logging;
pub mod optional_auth;
