pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod models;
pub mod permission;
pub mod ranking;
pub mod store;
pub mod visibility;
