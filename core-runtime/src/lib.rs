//! # Core Runtime Module
//!
//! Provides the ambient runtime infrastructure the persistence core relies on:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for persistence notifications
//!
//! ## Overview
//!
//! Nothing in here knows about playlists or stores. The crate establishes the
//! logging conventions, configuration validation and event broadcasting used
//! by `core-persistence` and by host applications embedding it.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
