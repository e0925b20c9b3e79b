pub mod app;
pub mod arr;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod models;
pub mod overseerr;
pub mod resolver;
