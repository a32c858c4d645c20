//! HTTP handlers for the Fleet Management Platform

pub mod agreement;
pub mod agreement_template;
pub mod attachment;
pub mod audit_log;
pub mod auth;
pub mod compliance;
pub mod dashboard;
pub mod driver;
pub mod email_config;
pub mod health;
pub mod inspection;
pub mod role;
pub mod signing;
pub mod user;
pub mod vehicle;
pub mod vehicle_group;

pub use agreement::*;
pub use agreement_template::*;
pub use attachment::*;
pub use audit_log::*;
pub use auth::*;
pub use compliance::*;
pub use dashboard::*;
pub use driver::*;
pub use email_config::*;
pub use health::*;
pub use inspection::*;
pub use role::*;
pub use signing::*;
pub use user::*;
pub use vehicle::*;
pub use vehicle_group::*;
