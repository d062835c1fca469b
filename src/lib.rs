//! MangaGrab: downloads manga chapter images by rendering the chapter page in a
//! headless browser, selecting image URLs with a per-site adapter and saving them
//! under `<downloads>/<title>/001.<ext>`.

pub mod adapters;
pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod server;
pub mod storage;
pub mod traits;
pub mod utils;
