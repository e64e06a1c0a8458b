//! Infrastructure layer.
//!
//! Technical concerns that support the application without containing
//! request logic.
//!
//! # Submodules
//!
//! - [`bootstrap`] - Composition root for runtime wiring
//! - [`clock`] - System clock
//! - [`config`] - Configuration loading and validation
//! - [`scheduler`] - Owned periodic background tasks

pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod scheduler;
