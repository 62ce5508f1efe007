// src/lib.rs

pub mod clock;
pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

pub use routes::create_router;
