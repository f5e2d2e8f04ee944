pub mod budget;
pub mod document_store;
pub mod error;
pub mod image;
pub mod image_processor_trait;
pub mod profile;
pub mod tweet;
