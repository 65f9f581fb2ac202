//! Core library: asset listing, OCR orchestration with a storage-backed cache, configuration.

pub mod assets;
pub mod config;
pub mod document;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod poll;
