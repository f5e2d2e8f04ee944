pub mod avatar_editor;
pub mod error;
pub mod normalizer_service;
pub mod pending;
pub mod post_composer;
