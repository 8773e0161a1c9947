//! Utility modules: developer logging, logger setup, JSON and numeric helpers.
pub mod devlog;
pub mod json;
pub mod logger;
pub mod num;
