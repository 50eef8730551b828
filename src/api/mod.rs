//! API module for the HTTP surface
//!
//! REST endpoints for submitting payloads, querying events, and running
//! bulk stack and client-IP updates. Every route shares one [`AppState`].

pub mod http;
pub mod rest;
pub mod server;
pub mod state;

pub use http::create_router;
pub use server::{serve, serve_on, ServerConfig, ServerError, BIND_ADDR_ENV};
pub use state::AppState;
