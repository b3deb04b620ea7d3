//! labsexplained - upload lab results and read their interpretation
//!
//! The library holds everything the terminal client is built from so the
//! binary and the integration tests share one implementation.

pub mod api;
pub mod app;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod persist;
pub mod pipeline;
pub mod routes;
pub mod session;
pub mod ui;
pub mod wizard;
