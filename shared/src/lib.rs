//! Shared types and models for the Fleet Management Platform
//!
//! This crate contains the domain vocabulary (statuses, permissions, the
//! agreement lifecycle, the compliance week) and the pure rules built on it.
//! Nothing in here performs I/O.

pub mod models;
pub mod template;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
