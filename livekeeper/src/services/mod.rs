//! Service layer module.
//!
//! This module provides the service container and initialization logic
//! for the core services.

pub mod container;

pub use container::{CoreComponents, ServiceContainer, ServiceStats};
