//! Shared types, error model, and configuration for Repodex.
//!
//! This crate is the foundation depended on by all other Repodex crates.
//! It provides:
//! - [`RepodexError`] — the unified error type
//! - Domain types ([`Category`], [`Repository`], [`CategoryNode`], views)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AuthConfig, BootstrapConfig, DatabaseConfig, ServerConfig, config_dir,
    config_file_path, load_config, load_config_from,
};
pub use error::{RepodexError, Result};
pub use types::{
    Admin, Category, CategoryNode, CategoryPathEntry, ConfigEntry, MAX_CATEGORY_LEVEL, Page,
    Repository, RepositoryView, parse_github_url,
};
