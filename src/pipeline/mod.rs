//! Multi-component pipeline downloads driven by `model_index.json`.
//!
//! A pipeline repository holds one subdirectory per component (`unet`,
//! `vae`, `text_encoder`, ...). The selector parses the index, derives
//! an allow-pattern set for a requested variant and weight format,
//! drives the snapshot downloader with it, verifies every component
//! received a weight file, and falls back across formats when one is
//! not fully available.

mod download;
mod types;

pub use download::PipelineDownloader;
pub use types::{DownloadOptions, ModelIndex};
