//! Conversion driver module
//!
//! Read, post-process and write orchestration used by the command-line tool.

mod converter;


pub use converter::{ConversionConfig, Converter};
