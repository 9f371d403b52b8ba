//! Utility modules: developer log capture, logger configuration, numeric conversions.
pub mod devlog;
pub mod logger;
pub mod num;
