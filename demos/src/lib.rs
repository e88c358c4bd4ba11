//! # Plugin GPU Host Demos
//!
//! Sample plugins and headless drivers for the plugin GPU host.
//!
//! ## Available Demos
//!
//! - `hot_reload_demo` - Two plugins sharing one engine, with one reloaded mid-run

pub mod plugins;

/// Demos library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
