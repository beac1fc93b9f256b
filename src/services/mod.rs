pub mod cache;
pub mod config;
pub mod executor;
pub mod logger;
pub mod request;
pub mod transport;
