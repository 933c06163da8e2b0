//! Shared configuration utilities
//!
//! - Generic YAML config loading/saving
//! - Standard config and cache locations
//!
//! # Usage
//!
//! ```ignore
//! use organum_core::config::{load_config, save_config, default_config_path};
//!
//! let config: OrganConfig = load_config(&default_config_path());
//! save_config(&config, &default_config_path())?;
//! ```

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_cache_dir, default_config_path};
