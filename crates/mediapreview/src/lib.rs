pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod img;
pub mod preview;
pub mod serve;
pub mod workspace;
