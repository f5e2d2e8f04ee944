pub mod axum_handler;
pub mod config;
pub mod data_uri;
pub mod error;
pub mod image_processor;
pub mod memory_store;
