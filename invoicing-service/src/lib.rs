//! invoicing-service: invoice lifecycle and PDF rendering for small businesses.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod render;
pub mod services;
pub mod startup;
pub mod utils;

pub use startup::{build_router, AppState, Application};
