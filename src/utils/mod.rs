//! Utility modules for common functionality

pub mod signal;

// Re-export commonly used items
pub use signal::{shutdown_signal, Shutdown};

// vim: ts=4
