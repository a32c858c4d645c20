//! Driver models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Employment status of a driver
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Active => "active",
            DriverStatus::Inactive => "inactive",
            DriverStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for DriverStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DriverStatus::Active),
            "inactive" => Ok(DriverStatus::Inactive),
            "suspended" => Ok(DriverStatus::Suspended),
            _ => Err(format!("unknown driver status: {}", s)),
        }
    }
}

/// Licence validity relative to a reference date
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LicenceState {
    Valid,
    /// Expires within the warning window
    ExpiringSoon,
    Expired,
}

/// Days before expiry at which a licence counts as expiring
pub const LICENCE_EXPIRY_WARNING_DAYS: i64 = 30;

/// Classify a licence expiry date
pub fn licence_state(expiry: NaiveDate, today: NaiveDate) -> LicenceState {
    let days_left = (expiry - today).num_days();
    if days_left < 0 {
        LicenceState::Expired
    } else if days_left <= LICENCE_EXPIRY_WARNING_DAYS {
        LicenceState::ExpiringSoon
    } else {
        LicenceState::Valid
    }
}
