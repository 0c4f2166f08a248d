pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod stats;
pub mod stats_server;
pub mod storage;
pub mod time;
