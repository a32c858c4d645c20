//! Domain models for the Fleet Management Platform

mod agreement;
mod attachment;
mod compliance;
mod driver;
mod inspection;
mod user;
mod vehicle;

pub use agreement::*;
pub use attachment::*;
pub use compliance::*;
pub use driver::*;
pub use inspection::*;
pub use user::*;
pub use vehicle::*;
