//! Business logic services for the Fleet Management Platform

pub mod agreement;
pub mod agreement_template;
pub mod attachment;
pub mod audit;
pub mod auth;
pub mod compliance;
pub mod dashboard;
pub mod driver;
pub mod email_config;
pub mod export;
pub mod inspection;
pub mod role;
pub mod user;
pub mod vehicle;
pub mod vehicle_group;

pub use agreement::AgreementService;
pub use agreement_template::AgreementTemplateService;
pub use attachment::AttachmentService;
pub use audit::{Actor, AuditService};
pub use auth::AuthService;
pub use compliance::ComplianceService;
pub use dashboard::DashboardService;
pub use driver::DriverService;
pub use email_config::EmailConfigService;
pub use inspection::InspectionService;
pub use role::RoleService;
pub use user::UserService;
pub use vehicle::VehicleService;
pub use vehicle_group::VehicleGroupService;
