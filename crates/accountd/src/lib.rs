//! Account Service Library
//!
//! This library provides the core components for the accountd backend: user
//! account endpoints and the site settings store.

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod settings;
pub mod user;
