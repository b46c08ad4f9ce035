//! Settings module - site-wide key-value configuration.
//!
//! Provides:
//! - Named string values with replace-on-write semantics
//! - Lazy creation of the backing table on the first failed write

mod repository;
mod service;

pub use repository::{SETTINGS_TABLE, SettingsRepository};
pub use service::{BACKGROUND_IMAGE_KEY, SettingsService};
