//! External service integrations

pub mod email;
pub mod storage;

pub use email::{EmailService, SmtpSettings};
pub use storage::StorageClient;
