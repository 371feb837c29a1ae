//! # Attendance Core Configuration
//!
//! Centralized settings for the backend connection pool and the reverse
//! geocoding service.
//!
//! ## Features
//!
//! - **Defaults**: One place for every default value and limit
//! - **Environment Loading**: Flat `KEY=value` settings with an optional TOML file
//! - **Validation**: Misconfiguration is rejected at startup, never at request time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_config::Settings;
//!
//! let settings = Settings::from_env().expect("invalid configuration");
//! println!("pool ceiling: {}", settings.pool.max_connections);
//! ```

pub mod defaults;
pub mod settings;

pub use settings::{ConfigError, LookupSettings, PoolSettings, ProviderKind, Settings};
