//! # staffport-server
//!
//! HTTP server for the staffport employee portal: the edge gatekeeper
//! middleware, the protected dashboard surface, the login surface, and
//! the configuration/observability plumbing around them.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod state;

pub use server::build_app;
pub use state::AppState;
