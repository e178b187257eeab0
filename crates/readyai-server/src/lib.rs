//! Ready_Ai background server.
//!
//! Frame monitors and the browser-host shim connect here over WebSocket; the
//! HTTP API covers settings, custom sites and inspection. Split from main.rs
//! so the router can be driven from integration tests.

pub mod app;
pub mod bridge;
pub mod config;
pub mod frames_ws;
pub mod host_ws;
pub mod logging;
pub mod routes;
pub mod settings_store;
pub mod state;
