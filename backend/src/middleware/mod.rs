//! Request middleware and extractors

pub mod auth;
pub mod client;

pub use auth::{auth_middleware, AuthUser, CurrentUser, SESSION_COOKIE};
pub use client::ClientInfo;
