pub mod chunk_upload;
pub mod health;
pub mod upload;
